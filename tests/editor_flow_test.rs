//! 메모 작성 흐름 테스트: 생성, 미디어 첨부, 위젯/공유 진입점

use image::{DynamicImage, Rgb, RgbImage};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use handymemo_lib::config::Config;
use handymemo_lib::error::{Error, Result};
use handymemo_lib::index::PassOutcome;
use handymemo_lib::intents::compose_shared_text;
use handymemo_lib::memo::thumbnail::FrameExtractor;
use handymemo_lib::settings::WidgetSetting;
use handymemo_lib::tree::LocalTreeOpener;
use handymemo_lib::App;

struct StubFrames {
    calls: AtomicUsize,
}

impl FrameExtractor for StubFrames {
    fn frame_near(&self, _video: &[u8], _at: Duration) -> Result<DynamicImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([0, 0, 255]))))
    }
}

fn open_app(temp_dir: &TempDir, extractor: Option<Arc<dyn FrameExtractor>>, with_root: bool) -> App {
    let vault = temp_dir.path().join("vault");
    fs::create_dir_all(&vault).unwrap();
    let config = Config::with_data_dir(temp_dir.path().join("data"));
    let app = App::open_with(config, Arc::new(LocalTreeOpener), extractor).unwrap();
    if with_root {
        app.settings
            .set_root_tree_location(Some(vault.to_string_lossy().to_string()))
            .unwrap();
    }
    app
}

// ============================================================================
// 메모 생성
// ============================================================================

#[tokio::test]
async fn test_create_memo_writes_file_and_cache() {
    let temp_dir = TempDir::new().unwrap();
    let app = open_app(&temp_dir, None, true);

    let entry = app.repository.create_memo("first thought").await.unwrap();

    let on_disk = temp_dir.path().join("vault").join(&entry.path);
    assert_eq!(fs::read_to_string(&on_disk).unwrap(), "first thought");
    assert!(entry.path.starts_with("memos/"));
    assert!(entry.path.ends_with(&format!("{}.md", entry.display_name)));
    assert_eq!(app.cache.get_by_key(&entry.path).unwrap(), Some(entry.clone()));

    // a full pass agrees with the incremental insert
    assert!(app.indexer.run_index_pass(true).await.is_success());
    assert_eq!(app.cache.get_by_key(&entry.path).unwrap(), Some(entry));
}

#[tokio::test]
async fn test_create_memo_without_root_fails_without_cache_write() {
    let temp_dir = TempDir::new().unwrap();
    let app = open_app(&temp_dir, None, false);

    let result = app.repository.create_memo("orphan").await;
    assert!(matches!(result, Err(Error::RootNotConfigured)));
    assert_eq!(app.cache.count().unwrap(), 0);
}

#[tokio::test]
async fn test_create_memo_with_missing_root_fails() {
    let temp_dir = TempDir::new().unwrap();
    let app = open_app(&temp_dir, None, false);
    app.settings
        .set_root_tree_location(Some(temp_dir.path().join("unplugged").to_string_lossy().to_string()))
        .unwrap();

    assert!(app.repository.create_memo("lost").await.is_err());
    assert_eq!(app.cache.count().unwrap(), 0, "쓰기 실패 시 캐시에 넣지 않아야 함");
}

// ============================================================================
// 미디어 첨부
// ============================================================================

#[tokio::test]
async fn test_attach_then_detail_resolves_media() {
    let temp_dir = TempDir::new().unwrap();
    let frames = Arc::new(StubFrames {
        calls: AtomicUsize::new(0),
    });
    let app = open_app(&temp_dir, Some(frames.clone()), true);

    let photo = temp_dir.path().join("photo.png");
    let clip = temp_dir.path().join("clip.mp4");
    fs::write(&photo, "png bytes").unwrap();
    fs::write(&clip, "mp4 bytes").unwrap();

    let inserts = app.repository.attach_media(&[photo, clip]).await.unwrap();
    assert_eq!(inserts.len(), 1);
    assert!(inserts[0].starts_with("\n![Image](../../../images/"));
    assert!(inserts[0].contains("\n\n![Video](../../../videos/"));
    assert!(inserts[0].ends_with(".mp4)\n"));

    let entry = app
        .repository
        .create_memo(&format!("Trip{}", inserts[0]))
        .await
        .unwrap();
    let memo = app.repository.memo_detail(&entry.path).await.unwrap().unwrap();

    assert_eq!(memo.body_text, "Trip\n[Media Inserted]\n\n[Media Inserted]");
    assert_eq!(memo.attachments.len(), 2);
    assert!(!memo.attachments[0].is_video);
    assert!(memo.attachments[0].thumbnail.is_none());
    assert!(memo.attachments[1].is_video);
    let thumbnail = memo.attachments[1].thumbnail.clone().expect("동영상은 썸네일이 있어야 함");
    assert!(thumbnail.starts_with(&app.config.thumbnail_dir));

    // second read reuses the cached thumbnail
    let again = app.repository.memo_detail(&entry.path).await.unwrap().unwrap();
    assert_eq!(again.attachments[1].thumbnail, Some(thumbnail));
    assert_eq!(frames.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_attach_unknown_type_reports_error_text() {
    let temp_dir = TempDir::new().unwrap();
    let app = open_app(&temp_dir, None, true);
    let mystery = temp_dir.path().join("blob.zzqx");
    fs::write(&mystery, "???").unwrap();

    let inserts = app.repository.attach_media(&[mystery]).await.unwrap();
    assert_eq!(inserts.len(), 1);
    assert!(inserts[0].contains("unknown file type"));
    assert!(!temp_dir.path().join("vault/images").exists());
}

// ============================================================================
// 위젯 / 공유 진입점
// ============================================================================

#[tokio::test]
async fn test_widget_tap_uses_saved_template() {
    let temp_dir = TempDir::new().unwrap();
    let app = open_app(&temp_dir, None, true);
    app.widgets
        .save(
            7,
            WidgetSetting {
                template_name: Some("Journal".to_string()),
                template_text: Some("## Today\n".to_string()),
                icon_id: None,
            },
        )
        .unwrap();

    let template = app.widgets.get(7).unwrap().template_text;
    app.intents.on_widget_tapped(template.as_deref()).unwrap();

    assert_eq!(app.intents.take_pending().as_deref(), Some("## Today\n"));
    assert_eq!(app.settings.last_used_template().unwrap(), "## Today\n");
}

#[tokio::test]
async fn test_share_flow_saves_memo() {
    let temp_dir = TempDir::new().unwrap();
    let app = open_app(&temp_dir, None, true);
    app.settings.set_share_intent_template("\n\n#later").unwrap();

    let shared = compose_shared_text(Some("https://example.test/a"), None, Some("Podcast episode"));
    app.intents.on_share_received(&shared).unwrap();
    let text = app.intents.take_pending().unwrap();
    assert_eq!(text, "Podcast episode\nhttps://example.test/a\n\n#later");

    let entry = app.repository.create_memo(&text).await.unwrap();
    let PassOutcome::Success(report) = app.indexer.run_index_pass(true).await else {
        panic!("pass should succeed");
    };
    assert_eq!(report.indexed_count, 1);

    let found = app.cache.list_paged_by_search("podcast #LATER", 0, 20).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].path, entry.path);
}
