use chrono::TimeZone;
use serde::Serialize;
use std::sync::Arc;

use super::year_month::YearMonth;
use crate::cache::{CacheStore, MemoListItem};
use crate::error::Result;
use crate::run_blocking;

pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Which slice of the cache a list shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MemoQuery {
    All,
    /// Half-open `[start_ms, end_ms)` creation range
    Month { start_ms: i64, end_ms: i64 },
    Search { query: String },
}

impl MemoQuery {
    pub fn for_month<Tz: TimeZone>(month: &YearMonth, tz: &Tz) -> Self {
        MemoQuery::Month {
            start_ms: month.start_timestamp(tz),
            end_ms: month.end_timestamp(tz),
        }
    }

    pub fn fetch_page(&self, cache: &CacheStore, offset: usize, limit: usize) -> Result<Vec<MemoListItem>> {
        match self {
            MemoQuery::All => cache.list_paged(offset, limit),
            MemoQuery::Month { start_ms, end_ms } => cache.list_paged_by_month_range(*start_ms, *end_ms, offset, limit),
            MemoQuery::Search { query } => cache.list_paged_by_search(query, offset, limit),
        }
    }
}

/// Pages of a [`MemoQuery`], fetched one at a time on demand.
///
/// Iteration stops after the first short page. A query with no rows yields
/// no pages at all.
pub struct MemoPager {
    cache: Arc<CacheStore>,
    query: MemoQuery,
    page_size: usize,
    offset: usize,
    exhausted: bool,
}

impl MemoPager {
    pub fn new(cache: Arc<CacheStore>, query: MemoQuery, page_size: usize) -> Self {
        Self {
            cache,
            query,
            page_size: page_size.max(1),
            offset: 0,
            exhausted: false,
        }
    }

    pub fn query(&self) -> &MemoQuery {
        &self.query
    }

    /// Async variant of [`Iterator::next`]; the query runs on a blocking task.
    pub async fn next_page(&mut self) -> Result<Option<Vec<MemoListItem>>> {
        if self.exhausted {
            return Ok(None);
        }
        let cache = self.cache.clone();
        let query = self.query.clone();
        let (offset, limit) = (self.offset, self.page_size);
        let page = run_blocking(move || query.fetch_page(&cache, offset, limit)).await?;
        Ok(self.accept(page))
    }

    fn accept(&mut self, page: Vec<MemoListItem>) -> Option<Vec<MemoListItem>> {
        if page.len() < self.page_size {
            self.exhausted = true;
        }
        if page.is_empty() {
            return None;
        }
        self.offset += page.len();
        Some(page)
    }
}

impl Iterator for MemoPager {
    type Item = Result<Vec<MemoListItem>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        match self.query.fetch_page(&self.cache, self.offset, self.page_size) {
            Ok(page) => self.accept(page).map(Ok),
            Err(e) => {
                self.exhausted = true;
                Some(Err(e))
            }
        }
    }
}
