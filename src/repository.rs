//! Interactive single-memo operations against the tree and the cache.

use chrono::{DateTime, Datelike, Local};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::{CacheStore, MemoCacheEntry};
use crate::error::{Error, Result};
use crate::index::MEMOS_DIR;
use crate::memo::attachment::{is_video_media_type, resolve_attachments};
use crate::memo::thumbnail::ThumbnailCache;
use crate::memo::{memo_id_for, parse_memo_file, parse_memo_time, MemoRecord, MEMO_EXTENSION};
use crate::run_blocking;
use crate::settings::SettingsRepository;
use crate::tree::{TreeAccessor, TreeNode, TreeOpener};

pub const IMAGES_DIR: &str = "images";
pub const VIDEOS_DIR: &str = "videos";

const MEMO_MEDIA_TYPE: &str = "text/markdown";

pub struct MemoRepository {
    settings: Arc<SettingsRepository>,
    opener: Arc<dyn TreeOpener>,
    cache: Arc<CacheStore>,
    thumbnails: Arc<ThumbnailCache>,
}

impl MemoRepository {
    pub fn new(
        settings: Arc<SettingsRepository>,
        opener: Arc<dyn TreeOpener>,
        cache: Arc<CacheStore>,
        thumbnails: Arc<ThumbnailCache>,
    ) -> Self {
        Self {
            settings,
            opener,
            cache,
            thumbnails,
        }
    }

    fn open_tree(&self) -> Result<Arc<dyn TreeAccessor>> {
        let root = self.settings.root_tree_location()?.ok_or(Error::RootNotConfigured)?;
        self.opener.open_tree(&root)
    }

    /// Write a new memo under `memos/<year>/<month>/` and add it to the cache.
    ///
    /// The cache only changes after the file write succeeded.
    pub async fn create_memo(&self, content: &str) -> Result<MemoCacheEntry> {
        let tree = self.open_tree()?;
        let cache = self.cache.clone();
        let content = content.to_string();

        let result = run_blocking(move || {
            let now = Local::now();
            let id = memo_id_for(&now);
            let month_dir = dated_dir(tree.as_ref(), MEMOS_DIR, &now)?;
            let file = tree.create_file(
                &month_dir.location,
                MEMO_MEDIA_TYPE,
                &format!("{}{}", id, MEMO_EXTENSION),
            )?;
            tree.write(&file.location, content.as_bytes())?;

            let created_at_ms = parse_memo_time(&id)
                .map(|time| time.timestamp_millis())
                .unwrap_or_else(|_| now.timestamp_millis());
            let entry = MemoCacheEntry {
                path: file.location.as_str().to_string(),
                display_name: id,
                created_at_ms,
                full_text: content,
            };
            cache.insert(&entry)?;
            Ok(entry)
        })
        .await;

        match &result {
            Ok(entry) => log::info!("[MemoRepository] Created memo {}", entry.path),
            Err(e) => log::error!("[MemoRepository] Failed to create memo: {}", e),
        }
        result
    }

    /// Copy media files into the tree and build the markdown to insert.
    ///
    /// Returns the texts to insert into the editor, in order. A source whose
    /// type cannot be determined stops the batch and contributes an error
    /// message instead; links for files copied before it are still returned.
    pub async fn attach_media(&self, sources: &[PathBuf]) -> Result<Vec<String>> {
        let tree = self.open_tree()?;
        let sources = sources.to_vec();
        run_blocking(move || Ok(copy_media(tree.as_ref(), &sources, &Local::now()))).await
    }

    /// Full memo for a cached path, attachments resolved against the tree.
    pub async fn memo_detail(&self, path: &str) -> Result<Option<MemoRecord>> {
        let cache = self.cache.clone();
        let lookup = path.to_string();
        let Some(entry) = run_blocking(move || cache.get_by_key(&lookup)).await? else {
            return Ok(None);
        };

        let tree = self.open_tree()?;
        let thumbnails = self.thumbnails.clone();
        run_blocking(move || {
            let mut record = parse_memo_file(&entry.display_name, &entry.full_text)
                .map_err(|e| Error::Other(format!("{}: {}", entry.path, e)))?;
            record.attachments = resolve_attachments(tree.as_ref(), &entry.full_text, &thumbnails);
            Ok(Some(record))
        })
        .await
    }
}

/// `<top>/<year>/<month:02>`, created as needed.
fn dated_dir(tree: &dyn TreeAccessor, top: &str, now: &DateTime<Local>) -> Result<TreeNode> {
    let root = tree.root()?;
    let top_dir = tree.find_or_create_directory(&root.location, top)?;
    let year_dir = tree.find_or_create_directory(&top_dir.location, &now.year().to_string())?;
    tree.find_or_create_directory(&year_dir.location, &format!("{:02}", now.month()))
}

fn copy_media(tree: &dyn TreeAccessor, sources: &[PathBuf], now: &DateTime<Local>) -> Vec<String> {
    let id = memo_id_for(now);
    let mut inserts = Vec::new();
    let mut links = Vec::new();

    for (index, source) in sources.iter().enumerate() {
        let Some(mime) = mime_guess::from_path(source).first() else {
            log::error!("[MemoRepository] Unknown media type for {:?}", source);
            inserts.push(format!(
                "Failed to attach media due to unknown file type: {}",
                source.display()
            ));
            break;
        };
        let media_type = mime.essence_str().to_string();
        let Some(extension) = media_extension(source) else {
            inserts.push(format!(
                "Failed to attach media due to unknown file type: {}",
                media_type
            ));
            break;
        };

        match copy_one(tree, source, &media_type, &extension, &id, index, now) {
            Ok(link) => links.push(link),
            Err(e) => log::error!("[MemoRepository] Failed to copy media from {:?}: {}", source, e),
        }
    }

    if !links.is_empty() {
        inserts.push(format!("\n{}\n", links.join("\n\n")));
    }
    inserts
}

fn media_extension(source: &Path) -> Option<String> {
    source
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .filter(|ext| !ext.is_empty())
}

fn copy_one(
    tree: &dyn TreeAccessor,
    source: &Path,
    media_type: &str,
    extension: &str,
    id: &str,
    index: usize,
    now: &DateTime<Local>,
) -> Result<String> {
    let is_video = is_video_media_type(Some(media_type));
    let (top, alt) = if is_video { (VIDEOS_DIR, "Video") } else { (IMAGES_DIR, "Image") };

    let bytes = fs::read(source)?;
    let month_dir = dated_dir(tree, top, now)?;
    let file = tree.create_file(&month_dir.location, media_type, &format!("{}-{}.{}", id, index, extension))?;
    tree.write(&file.location, &bytes)?;

    Ok(format!(
        "![{}](../../../{}/{}/{:02}/{})",
        alt,
        top,
        now.year(),
        now.month(),
        file.name
    ))
}
