pub mod cache;
pub mod config;
pub mod error;
pub mod index;
pub mod intents;
pub mod memo;
pub mod repository;
pub mod settings;
pub mod tree;
pub mod view;

use std::fs;
use std::sync::Arc;

use cache::CacheStore;
use config::Config;
use error::{Error, Result};
use index::lifecycle::AppLifecycle;
use index::scheduler::IndexScheduler;
use index::Indexer;
use intents::EditorIntents;
use memo::thumbnail::{FfmpegFrameExtractor, FrameExtractor, ThumbnailCache};
use repository::MemoRepository;
use settings::{SettingsRepository, WidgetSettingRepository};
use tree::{LocalTreeOpener, TreeOpener};
use view::MemoListView;

/// Run blocking tree or database work off the async executor.
pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::Other(format!("blocking task failed: {}", e)))?
}

/// One instance per process: owns the cache and hands shared handles to
/// every consumer.
pub struct App {
    pub config: Config,
    pub settings: Arc<SettingsRepository>,
    pub widgets: Arc<WidgetSettingRepository>,
    pub cache: Arc<CacheStore>,
    pub lifecycle: Arc<AppLifecycle>,
    pub indexer: Arc<Indexer>,
    pub scheduler: IndexScheduler,
    pub repository: MemoRepository,
    pub intents: EditorIntents,
}

impl App {
    /// Local directory trees and ffmpeg thumbnails. Needs a tokio runtime.
    pub fn open(config: Config) -> Result<Self> {
        Self::open_with(config, Arc::new(LocalTreeOpener), Some(Arc::new(FfmpegFrameExtractor::default())))
    }

    pub fn open_with(
        config: Config,
        opener: Arc<dyn TreeOpener>,
        extractor: Option<Arc<dyn FrameExtractor>>,
    ) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)?;
        log::info!("[App] Data directory: {}", config.data_dir.display());

        let settings = Arc::new(SettingsRepository::open(config.settings_path())?);
        let widgets = Arc::new(WidgetSettingRepository::open(config.widget_settings_path())?);
        let cache = Arc::new(CacheStore::open(&config.db_path)?);
        let lifecycle = Arc::new(AppLifecycle::new());
        let thumbnails = Arc::new(match extractor {
            Some(extractor) => ThumbnailCache::new(&config.thumbnail_dir, extractor),
            None => ThumbnailCache::disabled(&config.thumbnail_dir),
        });

        let indexer = Arc::new(Indexer::new(
            settings.clone(),
            opener.clone(),
            cache.clone(),
            lifecycle.clone(),
        ));
        let scheduler = IndexScheduler::new(indexer.clone(), config.retry_backoff, config.retry_backoff_max)?;
        let repository = MemoRepository::new(settings.clone(), opener, cache.clone(), thumbnails);
        let intents = EditorIntents::new(settings.clone());

        Ok(Self {
            config,
            settings,
            widgets,
            cache,
            lifecycle,
            indexer,
            scheduler,
            repository,
            intents,
        })
    }

    /// Register the startup and periodic indexing passes.
    pub fn start(&self) -> Result<()> {
        self.scheduler
            .register_startup(self.config.startup_delay, self.config.index_interval)
    }

    /// Choose a new vault root and queue a reindex of it.
    pub fn set_root(&self, root: &str) -> Result<()> {
        self.settings.set_root_tree_location(Some(root.to_string()))?;
        self.scheduler.trigger_manual()?;
        Ok(())
    }

    /// A list view that refreshes after every successful one-time pass.
    pub fn memo_list_view(&self) -> Result<MemoListView> {
        MemoListView::spawn(
            self.cache.clone(),
            self.config.page_size,
            self.config.search_debounce,
            Some(self.scheduler.subscribe()),
        )
    }
}
