//! Background indexing of the memo tree into the cache.
//!
//! A pass walks `memos/` under the configured root, parses every `.md` file
//! and replaces the whole cache in one transaction. Parse failures are counted
//! and skipped; they never abort the pass.

pub mod lifecycle;
pub mod scheduler;

use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::cache::{CacheStore, MemoCacheEntry};
use crate::error::{Error, Result};
use crate::memo::{memo_base_name, parse_memo_file, ParseFailure, MEMO_EXTENSION};
use crate::run_blocking;
use crate::settings::SettingsRepository;
use crate::tree::{TreeAccessor, TreeLocation, TreeNode, TreeOpener};
use lifecycle::LifecycleState;

/// Name of the directory under the root that holds memo files.
pub const MEMOS_DIR: &str = "memos";

/// Files parsed concurrently within one directory.
pub const PARSE_CHUNK_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Foreground,
    RootNotConfigured,
    MemosDirMissing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexError {
    pub file_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub indexed_count: usize,
    pub error_count: usize,
    pub errors: Vec<IndexError>,
    /// Set when the pass did no work
    pub skipped: Option<SkipReason>,
}

impl IndexReport {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PassOutcome {
    Success(IndexReport),
    /// Transient failure; the scheduler re-enqueues with backoff
    Retry { reason: String },
    Failure { message: String },
}

impl PassOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PassOutcome::Success(_))
    }
}

pub type PassFuture<'a> = Pin<Box<dyn Future<Output = PassOutcome> + Send + 'a>>;

/// Something the scheduler can run as one indexing pass.
pub trait PassRunner: Send + Sync + 'static {
    fn run_pass(&self, is_manual: bool) -> PassFuture<'_>;
}

#[derive(Default)]
struct PassAccumulator {
    entries: Vec<MemoCacheEntry>,
    errors: Vec<IndexError>,
}

pub struct Indexer {
    settings: Arc<SettingsRepository>,
    opener: Arc<dyn TreeOpener>,
    cache: Arc<CacheStore>,
    lifecycle: Arc<dyn LifecycleState>,
}

impl Indexer {
    pub fn new(
        settings: Arc<SettingsRepository>,
        opener: Arc<dyn TreeOpener>,
        cache: Arc<CacheStore>,
        lifecycle: Arc<dyn LifecycleState>,
    ) -> Self {
        Self {
            settings,
            opener,
            cache,
            lifecycle,
        }
    }

    /// Run one full pass. Manual passes ignore the foreground guard.
    pub async fn run_index_pass(&self, is_manual: bool) -> PassOutcome {
        if !is_manual && self.lifecycle.is_foreground() {
            log::info!("[MemoIndexer] App is in foreground, skipping automatic pass");
            return PassOutcome::Success(IndexReport::skipped(SkipReason::Foreground));
        }

        let root = match self.settings.root_tree_location() {
            Ok(Some(root)) => root,
            Ok(None) => {
                log::info!("[MemoIndexer] Root directory not configured, nothing to index");
                return PassOutcome::Success(IndexReport::skipped(SkipReason::RootNotConfigured));
            }
            Err(e) => {
                log::error!("[MemoIndexer] Failed to read settings: {}", e);
                return PassOutcome::Failure { message: e.to_string() };
            }
        };

        let (tree, root_node) = match self.open_root(root.clone()).await {
            Ok(opened) => opened,
            Err(e) => {
                log::error!("[MemoIndexer] Root directory not found: {} ({})", root, e);
                return PassOutcome::Failure {
                    message: format!("Root directory not found: {}", root),
                };
            }
        };

        let started = std::time::Instant::now();
        let collected = match self.collect_entries(tree, root_node).await {
            Ok(Some(acc)) => acc,
            Ok(None) => {
                log::info!("[MemoIndexer] No '{}' directory under root, nothing to index", MEMOS_DIR);
                return PassOutcome::Success(IndexReport::skipped(SkipReason::MemosDirMissing));
            }
            Err(e) => {
                log::error!("[MemoIndexer] Indexing failed: {}", e);
                return PassOutcome::Failure { message: e.to_string() };
            }
        };

        let indexed_count = collected.entries.len();
        let cache = self.cache.clone();
        let entries = collected.entries;
        if let Err(e) = run_blocking(move || cache.replace_all(&entries)).await {
            log::warn!("[MemoIndexer] Cache commit failed, will retry: {}", e);
            return PassOutcome::Retry { reason: e.to_string() };
        }

        log::info!(
            "[MemoIndexer] Indexed {} memos ({} errors) in {:?}",
            indexed_count,
            collected.errors.len(),
            started.elapsed()
        );
        PassOutcome::Success(IndexReport {
            indexed_count,
            error_count: collected.errors.len(),
            errors: collected.errors,
            skipped: None,
        })
    }

    async fn open_root(&self, root: String) -> Result<(Arc<dyn TreeAccessor>, TreeNode)> {
        let opener = self.opener.clone();
        run_blocking(move || {
            let tree = opener.open_tree(&root)?;
            let root_node = tree.root()?;
            Ok((tree, root_node))
        })
        .await
    }

    /// `None` when the memos directory does not exist.
    async fn collect_entries(
        &self,
        tree: Arc<dyn TreeAccessor>,
        root: TreeNode,
    ) -> Result<Option<PassAccumulator>> {
        let lookup = tree.clone();
        let memos_dir = run_blocking(move || lookup.find_child(&root.location, MEMOS_DIR)).await?;
        let Some(memos_dir) = memos_dir.filter(|node| node.is_dir) else {
            return Ok(None);
        };

        let mut acc = PassAccumulator::default();
        collect_dir(tree, memos_dir.location, &mut acc).await?;
        Ok(Some(acc))
    }
}

impl PassRunner for Indexer {
    fn run_pass(&self, is_manual: bool) -> PassFuture<'_> {
        Box::pin(self.run_index_pass(is_manual))
    }
}

/// Depth-first: this directory's memo files in chunks, then each subdirectory.
fn collect_dir<'a>(
    tree: Arc<dyn TreeAccessor>,
    dir: TreeLocation,
    acc: &'a mut PassAccumulator,
) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let lister = tree.clone();
        let children = run_blocking(move || lister.list_children(&dir)).await?;

        let (dirs, files): (Vec<TreeNode>, Vec<TreeNode>) =
            children.into_iter().partition(|child| child.is_dir);
        let memo_files: Vec<TreeNode> = files
            .into_iter()
            .filter(|file| file.name.ends_with(MEMO_EXTENSION))
            .collect();

        for chunk in memo_files.chunks(PARSE_CHUNK_SIZE) {
            let handles: Vec<_> = chunk
                .iter()
                .cloned()
                .map(|file| {
                    let tree = tree.clone();
                    let name = file.name.clone();
                    (name, tokio::task::spawn_blocking(move || index_file(tree.as_ref(), &file)))
                })
                .collect();

            for (file_name, handle) in handles {
                let result = handle
                    .await
                    .unwrap_or_else(|e| Err(ParseFailure::Unreadable { reason: e.to_string() }));
                match result {
                    Ok(entry) => acc.entries.push(entry),
                    Err(failure) => {
                        log::warn!("[MemoIndexer] Skipping {}: {}", file_name, failure);
                        acc.errors.push(IndexError {
                            file_name,
                            reason: failure.to_string(),
                        });
                    }
                }
            }
        }

        for sub_dir in dirs {
            collect_dir(tree.clone(), sub_dir.location, &mut *acc).await?;
        }
        Ok(())
    })
}

fn index_file(tree: &dyn TreeAccessor, file: &TreeNode) -> std::result::Result<MemoCacheEntry, ParseFailure> {
    let base_name = memo_base_name(&file.name).ok_or_else(|| ParseFailure::InvalidName {
        name: file.name.clone(),
    })?;
    let raw_text = tree
        .read_to_string(&file.location)
        .map_err(|e: Error| ParseFailure::Unreadable { reason: e.to_string() })?;
    let record = parse_memo_file(base_name, &raw_text)?;

    Ok(MemoCacheEntry {
        path: file.location.as_str().to_string(),
        display_name: record.id,
        created_at_ms: record.time.timestamp_millis(),
        full_text: raw_text,
    })
}
