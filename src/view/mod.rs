//! Live memo list over the cache.
//!
//! Three input signals feed one recomputation: the search text (debounced),
//! the displayed month, and a refresh counter bumped after every successful
//! index pass. Each recomputation publishes a new [`MemoListGeneration`];
//! consumers rebuild their pager whenever the generation changes.

pub mod paging;
pub mod year_month;

use chrono::Local;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::cache::CacheStore;
use crate::error::{Error, Result};
use crate::index::scheduler::IndexingStatus;
use crate::run_blocking;
use paging::{MemoPager, MemoQuery};
use year_month::YearMonth;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoListGeneration {
    pub generation: u64,
    pub query: MemoQuery,
}

/// Blank search shows the displayed month; anything else searches everything.
pub fn derive_query(search: &str, month: &YearMonth) -> MemoQuery {
    if search.trim().is_empty() {
        MemoQuery::for_month(month, &Local)
    } else {
        MemoQuery::Search {
            query: search.to_string(),
        }
    }
}

pub struct MemoListView {
    cache: Arc<CacheStore>,
    page_size: usize,
    search: watch::Sender<String>,
    month: watch::Sender<YearMonth>,
    refresh: Arc<watch::Sender<u64>>,
    generation: watch::Receiver<MemoListGeneration>,
    tasks: Vec<JoinHandle<()>>,
}

impl MemoListView {
    /// Start the view's background tasks on the current tokio runtime.
    ///
    /// With `status`, every transition to `Succeeded` bumps the refresh counter.
    pub fn spawn(
        cache: Arc<CacheStore>,
        page_size: usize,
        debounce: Duration,
        status: Option<watch::Receiver<IndexingStatus>>,
    ) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::Other(format!("memo list view needs a tokio runtime: {}", e)))?;
        let current_month = YearMonth::current(&Local)?;

        let (search, search_rx) = watch::channel(String::new());
        let (debounced, debounced_rx) = watch::channel(String::new());
        let (month, month_rx) = watch::channel(current_month);
        let (refresh, refresh_rx) = watch::channel(0u64);
        let refresh = Arc::new(refresh);
        let (generation_tx, generation) = watch::channel(MemoListGeneration {
            generation: 0,
            query: derive_query("", &current_month),
        });

        let mut tasks = vec![
            runtime.spawn(debounce_search(search_rx, debounced, debounce)),
            runtime.spawn(recompute(debounced_rx, month_rx, refresh_rx, generation_tx)),
        ];
        if let Some(status) = status {
            tasks.push(runtime.spawn(refresh_on_success(status, refresh.clone())));
        }

        Ok(Self {
            cache,
            page_size,
            search,
            month,
            refresh,
            generation,
            tasks,
        })
    }

    pub fn set_search_query(&self, query: &str) {
        self.search.send_replace(query.to_string());
    }

    pub fn search_query(&self) -> String {
        self.search.borrow().clone()
    }

    pub fn display_month(&self) -> YearMonth {
        *self.month.borrow()
    }

    /// Force a new generation with the same inputs.
    pub fn refresh(&self) {
        self.refresh.send_modify(|n| *n += 1);
    }

    /// Advance one month unless that would pass the real current month.
    pub fn move_to_next_month(&self) -> Result<bool> {
        let now = YearMonth::current(&Local)?;
        let next = self.display_month().next_month();
        if next.is_after(&now) || next.is_same(&self.display_month()) {
            return Ok(false);
        }
        self.month.send_replace(next);
        Ok(true)
    }

    /// Go back one month unless that would pass the oldest cached memo.
    pub async fn move_to_previous_month(&self) -> Result<bool> {
        let cache = self.cache.clone();
        let Some(oldest) = run_blocking(move || cache.get_oldest_creation_timestamp()).await? else {
            return Ok(false);
        };
        let oldest_month = YearMonth::from_timestamp(oldest, &Local)?;
        let displayed = self.display_month();
        let previous = displayed.previous_month();
        if previous.is_before(&oldest_month) || previous.is_same(&displayed) {
            return Ok(false);
        }
        self.month.send_replace(previous);
        Ok(true)
    }

    pub fn reset_to_current_month(&self) -> Result<()> {
        let now = YearMonth::current(&Local)?;
        self.month.send_if_modified(|month| {
            if *month == now {
                return false;
            }
            *month = now;
            true
        });
        Ok(())
    }

    pub fn current_generation(&self) -> MemoListGeneration {
        self.generation.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MemoListGeneration> {
        self.generation.clone()
    }

    /// A fresh pager over the current generation's query.
    pub fn pager(&self) -> MemoPager {
        MemoPager::new(self.cache.clone(), self.current_generation().query, self.page_size)
    }
}

impl Drop for MemoListView {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Forward the search text once it has been quiet for `debounce`.
async fn debounce_search(
    mut input: watch::Receiver<String>,
    output: watch::Sender<String>,
    debounce: Duration,
) {
    while input.changed().await.is_ok() {
        loop {
            match tokio::time::timeout(debounce, input.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) => return,
                Err(_) => break,
            }
        }
        let text = input.borrow_and_update().clone();
        output.send_if_modified(|current| {
            if *current == text {
                return false;
            }
            *current = text;
            true
        });
    }
}

async fn recompute(
    mut search: watch::Receiver<String>,
    mut month: watch::Receiver<YearMonth>,
    mut refresh: watch::Receiver<u64>,
    output: watch::Sender<MemoListGeneration>,
) {
    loop {
        let changed = tokio::select! {
            r = search.changed() => r,
            r = month.changed() => r,
            r = refresh.changed() => r,
        };
        if changed.is_err() {
            return;
        }

        let query = derive_query(&search.borrow_and_update(), &month.borrow_and_update());
        refresh.borrow_and_update();
        output.send_modify(|current| {
            current.generation += 1;
            current.query = query;
        });
        log::debug!("[MemoListView] Generation {}", output.borrow().generation);
    }
}

async fn refresh_on_success(mut status: watch::Receiver<IndexingStatus>, refresh: Arc<watch::Sender<u64>>) {
    while status.changed().await.is_ok() {
        if *status.borrow_and_update() == IndexingStatus::Succeeded {
            refresh.send_modify(|n| *n += 1);
        }
    }
}
