use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::path::PathBuf;

use super::thumbnail::ThumbnailCache;
use crate::tree::{TreeAccessor, TreeLocation, TreeNode};

/// Text substituted for every media link in the display body.
pub const MEDIA_PLACEHOLDER: &str = "[Media Inserted]";

/// `![alt](relative/path)`, non-greedy in both groups.
static MEDIA_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[(.*?)\]\((.*?)\)").expect("media link pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentDescriptor {
    pub location: TreeLocation,
    pub is_video: bool,
    /// Cached JPEG frame, only ever present for videos
    pub thumbnail: Option<PathBuf>,
}

/// Relative paths of all media links, in order of appearance.
pub fn extract_media_paths(text: &str) -> Vec<String> {
    MEDIA_LINK_RE
        .captures_iter(text)
        .map(|cap| cap[2].to_string())
        .collect()
}

/// Replace every media link with the placeholder and trim.
pub fn strip_media_links(text: &str) -> String {
    MEDIA_LINK_RE
        .replace_all(text, MEDIA_PLACEHOLDER)
        .trim()
        .to_string()
}

/// Walk `relative_path` from the tree root, one child lookup per segment.
///
/// Parent (`..`) and blank segments are dropped, since links are written
/// relative to the memo's own `memos/<year>/<month>/` folder. Returns `None`
/// for a missing segment, a directory, or the root itself.
pub fn find_media_file(tree: &dyn TreeAccessor, relative_path: &str) -> Option<TreeNode> {
    let root = tree.root().ok()?;
    let mut current = root.clone();

    for segment in relative_path
        .split('/')
        .filter(|s| !s.trim().is_empty() && *s != "..")
    {
        if !current.is_dir {
            return None;
        }
        current = tree.find_child(&current.location, segment).ok()??;
    }

    if current.location != root.location && current.is_file() {
        Some(current)
    } else {
        None
    }
}

pub fn is_video_media_type(media_type: Option<&str>) -> bool {
    media_type.map(|t| t.starts_with("video/")).unwrap_or(false)
}

/// Resolve every media link in `text` into attachments.
///
/// Broken links are dropped without error. Videos get a thumbnail when one
/// can be produced.
pub fn resolve_attachments(
    tree: &dyn TreeAccessor,
    text: &str,
    thumbnails: &ThumbnailCache,
) -> Vec<AttachmentDescriptor> {
    extract_media_paths(text)
        .iter()
        .filter_map(|relative_path| {
            let Some(media_file) = find_media_file(tree, relative_path) else {
                log::debug!("[Attachment] Dropping broken media link: {}", relative_path);
                return None;
            };
            let media_type = tree.media_type(&media_file.location);
            let is_video = is_video_media_type(media_type.as_deref());
            let thumbnail = if is_video {
                thumbnails.thumbnail_for(tree, &media_file.location)
            } else {
                None
            };
            Some(AttachmentDescriptor {
                location: media_file.location,
                is_video,
                thumbnail,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::LocalTree;
    use std::fs;
    use tempfile::TempDir;

    fn vault_with_image() -> (TempDir, LocalTree) {
        let temp_dir = TempDir::new().unwrap();
        let images = temp_dir.path().join("images/2024/05");
        fs::create_dir_all(&images).unwrap();
        fs::write(images.join("20240515120000-0.jpg"), "fake jpeg").unwrap();
        let tree = LocalTree::open(temp_dir.path()).unwrap();
        (temp_dir, tree)
    }

    #[test]
    fn test_extracts_paths_in_order() {
        let text = "a ![Image](../x-0.jpg) b ![Video](../y-1.mp4) ![](z.png)";
        assert_eq!(extract_media_paths(text), vec!["../x-0.jpg", "../y-1.mp4", "z.png"]);
    }

    #[test]
    fn test_ignores_plain_links() {
        assert!(extract_media_paths("[site](https://example.com)").is_empty());
    }

    #[test]
    fn test_strip_replaces_each_link() {
        let text = "\n![Image](a.jpg)\n\n![Image](b.jpg)\n";
        assert_eq!(strip_media_links(text), "[Media Inserted]\n\n[Media Inserted]");
    }

    #[test]
    fn test_find_media_file_skips_parent_segments() {
        let (_temp_dir, tree) = vault_with_image();
        let found = find_media_file(&tree, "../../../images/2024/05/20240515120000-0.jpg").unwrap();
        assert_eq!(found.location.as_str(), "images/2024/05/20240515120000-0.jpg");
    }

    #[test]
    fn test_find_media_file_rejects_directories_and_root() {
        let (_temp_dir, tree) = vault_with_image();
        assert!(find_media_file(&tree, "../../../images/2024").is_none(), "디렉토리는 첨부가 아님");
        assert!(find_media_file(&tree, "../..").is_none(), "루트 자신은 첨부가 아님");
        assert!(find_media_file(&tree, "").is_none());
    }

    #[test]
    fn test_broken_link_yields_no_attachment() {
        let (temp_dir, tree) = vault_with_image();
        let thumbnails = ThumbnailCache::disabled(temp_dir.path().join("thumbs"));
        let text = "![Image](../../../images/2024/05/x-0.jpg)";

        let attachments = resolve_attachments(&tree, text, &thumbnails);
        assert!(attachments.is_empty());
        assert_eq!(strip_media_links(text), MEDIA_PLACEHOLDER);
    }

    #[test]
    fn test_resolves_image_as_non_video() {
        let (temp_dir, tree) = vault_with_image();
        let thumbnails = ThumbnailCache::disabled(temp_dir.path().join("thumbs"));
        let text = "Hello ![Image](../../../images/2024/05/20240515120000-0.jpg)";

        let attachments = resolve_attachments(&tree, text, &thumbnails);
        assert_eq!(attachments.len(), 1);
        assert!(!attachments[0].is_video);
        assert!(attachments[0].thumbnail.is_none());
    }

    #[test]
    fn test_video_classification() {
        assert!(is_video_media_type(Some("video/mp4")));
        assert!(!is_video_media_type(Some("image/png")));
        assert!(!is_video_media_type(Some("application/octet-stream")));
        assert!(!is_video_media_type(None));
    }
}
