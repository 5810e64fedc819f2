//! Video thumbnails on local scratch storage.
//!
//! A thumbnail is keyed by a hash of the video's tree location, generated once
//! from a frame near the 1 second mark and reused afterwards.

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

use crate::error::{Error, Result};
use crate::tree::{TreeAccessor, TreeLocation};

pub const THUMBNAIL_FRAME_AT: Duration = Duration::from_secs(1);
pub const THUMBNAIL_JPEG_QUALITY: u8 = 80;

/// Decodes a single still frame from video bytes.
pub trait FrameExtractor: Send + Sync {
    fn frame_near(&self, video: &[u8], at: Duration) -> Result<DynamicImage>;
}

/// Frame extraction through an `ffmpeg` binary.
///
/// The video is spooled to a temp file first: ffmpeg cannot seek stdin, and
/// many MP4s keep their index at the end of the file.
pub struct FfmpegFrameExtractor {
    binary: PathBuf,
}

impl Default for FfmpegFrameExtractor {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("ffmpeg"),
        }
    }
}

impl FrameExtractor for FfmpegFrameExtractor {
    fn frame_near(&self, video: &[u8], at: Duration) -> Result<DynamicImage> {
        let mut input = NamedTempFile::new()?;
        input.write_all(video)?;
        input.flush()?;

        let seek = format!("{:.3}", at.as_secs_f64());
        let output = Command::new(&self.binary)
            .args(["-hide_banner", "-loglevel", "error", "-ss", &seek, "-i"])
            .arg(input.path())
            .args(["-frames:v", "1", "-f", "image2pipe", "-vcodec", "png", "pipe:1"])
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::Thumbnail(format!("Failed to start {:?}: {}", self.binary, e)))?;

        if !output.status.success() || output.stdout.is_empty() {
            return Err(Error::Thumbnail(format!(
                "ffmpeg produced no frame ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        image::load_from_memory_with_format(&output.stdout, ImageFormat::Png)
            .map_err(|e| Error::Thumbnail(format!("Failed to decode frame: {}", e)))
    }
}

pub struct ThumbnailCache {
    dir: PathBuf,
    extractor: Option<Arc<dyn FrameExtractor>>,
}

impl ThumbnailCache {
    pub fn new(dir: impl Into<PathBuf>, extractor: Arc<dyn FrameExtractor>) -> Self {
        Self {
            dir: dir.into(),
            extractor: Some(extractor),
        }
    }

    /// A cache that only serves thumbnails already on disk.
    pub fn disabled(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            extractor: None,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn cache_key(location: &TreeLocation) -> String {
        let mut hasher = DefaultHasher::new();
        location.as_str().hash(&mut hasher);
        format!("thumb_{:016x}.jpg", hasher.finish())
    }

    pub fn cached_path(&self, location: &TreeLocation) -> PathBuf {
        self.dir.join(Self::cache_key(location))
    }

    /// Existing or freshly generated thumbnail; `None` if generation fails.
    pub fn thumbnail_for(&self, tree: &dyn TreeAccessor, location: &TreeLocation) -> Option<PathBuf> {
        let path = self.cached_path(location);
        if path.exists() {
            return Some(path);
        }

        let extractor = self.extractor.as_ref()?;
        match self.generate(tree, location, extractor.as_ref(), &path) {
            Ok(()) => Some(path),
            Err(e) => {
                log::warn!("[Thumbnail] Failed to generate thumbnail for {}: {}", location, e);
                None
            }
        }
    }

    fn generate(
        &self,
        tree: &dyn TreeAccessor,
        location: &TreeLocation,
        extractor: &dyn FrameExtractor,
        path: &Path,
    ) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let video = tree.read(location)?;
        let frame = extractor.frame_near(&video, THUMBNAIL_FRAME_AT)?;

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, THUMBNAIL_JPEG_QUALITY)
            .encode_image(&frame.to_rgb8())
            .map_err(|e| Error::Thumbnail(format!("Failed to encode JPEG: {}", e)))?;

        let temp_path = path.with_extension("jpg.tmp");
        fs::write(&temp_path, &jpeg)?;
        fs::rename(&temp_path, path)?;
        log::debug!("[Thumbnail] Cached thumbnail for {} at {:?}", location, path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::LocalTree;
    use image::{Rgb, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct SolidFrame {
        calls: AtomicUsize,
    }

    impl FrameExtractor for SolidFrame {
        fn frame_near(&self, _video: &[u8], at: Duration) -> Result<DynamicImage> {
            assert_eq!(at, THUMBNAIL_FRAME_AT);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([200, 10, 10]))))
        }
    }

    struct BrokenFrame;

    impl FrameExtractor for BrokenFrame {
        fn frame_near(&self, _video: &[u8], _at: Duration) -> Result<DynamicImage> {
            Err(Error::Thumbnail("corrupt video".to_string()))
        }
    }

    fn vault_with_video() -> (TempDir, LocalTree, TreeLocation) {
        let temp_dir = TempDir::new().unwrap();
        let videos = temp_dir.path().join("vault/videos/2024/05");
        fs::create_dir_all(&videos).unwrap();
        fs::write(videos.join("20240515120000-0.mp4"), "fake video").unwrap();
        let tree = LocalTree::open(temp_dir.path().join("vault")).unwrap();
        (temp_dir, tree, TreeLocation::from("videos/2024/05/20240515120000-0.mp4"))
    }

    #[test]
    fn test_cache_key_is_deterministic() {
        let a = TreeLocation::from("videos/2024/05/a.mp4");
        let b = TreeLocation::from("videos/2024/05/b.mp4");
        assert_eq!(ThumbnailCache::cache_key(&a), ThumbnailCache::cache_key(&a));
        assert_ne!(ThumbnailCache::cache_key(&a), ThumbnailCache::cache_key(&b));
        assert!(ThumbnailCache::cache_key(&a).starts_with("thumb_"));
    }

    #[test]
    fn test_generates_once_then_reuses() {
        let (temp_dir, tree, video) = vault_with_video();
        let extractor = Arc::new(SolidFrame { calls: AtomicUsize::new(0) });
        let cache = ThumbnailCache::new(temp_dir.path().join("thumbs"), extractor.clone());

        let first = cache.thumbnail_for(&tree, &video).unwrap();
        let second = cache.thumbnail_for(&tree, &video).unwrap();

        assert_eq!(first, second);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1, "두 번째 호출은 캐시를 재사용해야 함");
        let bytes = fs::read(&first).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8], "JPEG SOI marker");
    }

    #[test]
    fn test_failure_yields_none() {
        let (temp_dir, tree, video) = vault_with_video();
        let cache = ThumbnailCache::new(temp_dir.path().join("thumbs"), Arc::new(BrokenFrame));
        assert!(cache.thumbnail_for(&tree, &video).is_none());
        assert!(!cache.cached_path(&video).exists());
    }

    #[test]
    fn test_disabled_cache_serves_existing_files_only() {
        let (temp_dir, tree, video) = vault_with_video();
        let cache = ThumbnailCache::disabled(temp_dir.path().join("thumbs"));
        assert!(cache.thumbnail_for(&tree, &video).is_none());

        fs::create_dir_all(cache.dir()).unwrap();
        fs::write(cache.cached_path(&video), "jpeg").unwrap();
        assert_eq!(cache.thumbnail_for(&tree, &video), Some(cache.cached_path(&video)));
    }

    #[cfg(unix)]
    fn fake_ffmpeg(dir: &Path, body: &str) -> FfmpegFrameExtractor {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("ffmpeg");
        fs::write(&script, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        FfmpegFrameExtractor { binary: script }
    }

    #[cfg(unix)]
    #[test]
    fn test_ffmpeg_reads_video_from_regular_file() {
        let temp_dir = TempDir::new().unwrap();
        let frame_path = temp_dir.path().join("frame.png");
        RgbImage::from_pixel(2, 2, Rgb([0, 255, 0])).save(&frame_path).unwrap();

        // succeeds only if -i names a regular file holding the video bytes
        let extractor = fake_ffmpeg(
            temp_dir.path(),
            &format!(
                "while [ \"$1\" != \"-i\" ]; do shift; done\n\
                 [ -f \"$2\" ] || exit 3\n\
                 [ \"$(cat \"$2\")\" = \"moov at the end\" ] || exit 4\n\
                 cat {:?}",
                frame_path
            ),
        );

        let frame = extractor.frame_near(b"moov at the end", THUMBNAIL_FRAME_AT).unwrap();
        assert_eq!(frame.to_rgb8().get_pixel(0, 0), &Rgb([0, 255, 0]));
    }

    #[cfg(unix)]
    #[test]
    fn test_ffmpeg_error_output_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        // more stderr than a pipe buffer holds
        let extractor = fake_ffmpeg(
            temp_dir.path(),
            "i=0; while [ $i -lt 2000 ]; do echo 'moov atom not found ................................' >&2; i=$((i+1)); done; exit 1",
        );

        let err = extractor.frame_near(b"video", THUMBNAIL_FRAME_AT).unwrap_err();
        assert!(err.to_string().contains("moov atom not found"), "에러 출력이 메시지에 포함되어야 함");
    }
}
