//! SQLite-backed memo cache.
//!
//! A derived index over the memo tree: one row per memo file, keyed by the
//! file's tree location. It can always be rebuilt from the tree, so the only
//! writes are a transactional full replace and single-row inserts.

pub mod search;

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoCacheEntry {
    pub path: String,
    pub display_name: String,
    /// Epoch milliseconds, computed once at index time
    pub created_at_ms: i64,
    /// Raw file content, media links included
    pub full_text: String,
}

/// Lightweight projection for list views (no full text).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoListItem {
    pub path: String,
    pub display_name: String,
    pub created_at_ms: i64,
}

const LIST_COLUMNS: &str = "path, display_name, created_at_ms";
const ORDER_NEWEST_FIRST: &str = "ORDER BY created_at_ms DESC, path DESC";

pub struct CacheStore {
    conn: Mutex<Connection>,
}

impl CacheStore {
    /// Open (or create) the cache at `path`; `:memory:` opens a private in-memory cache.
    pub fn open(path: &str) -> Result<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_tables()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Other("memo cache connection lock poisoned".to_string()))
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS memo_cache (
                path TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                created_at_ms INTEGER NOT NULL,
                full_text TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_memo_created_at ON memo_cache(created_at_ms)",
            [],
        )?;
        Ok(())
    }

    /// Clear the table and insert `entries` in one transaction.
    pub fn replace_all(&self, entries: &[MemoCacheEntry]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM memo_cache", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO memo_cache (path, display_name, created_at_ms, full_text)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for entry in entries {
                stmt.execute(params![
                    entry.path,
                    entry.display_name,
                    entry.created_at_ms,
                    entry.full_text
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Insert one entry, replacing any row with the same path.
    pub fn insert(&self, entry: &MemoCacheEntry) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO memo_cache (path, display_name, created_at_ms, full_text)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.path,
                entry.display_name,
                entry.created_at_ms,
                entry.full_text
            ],
        )?;
        Ok(())
    }

    pub fn get_by_key(&self, path: &str) -> Result<Option<MemoCacheEntry>> {
        let conn = self.lock()?;
        let entry = conn
            .query_row(
                "SELECT path, display_name, created_at_ms, full_text FROM memo_cache WHERE path = ?1",
                [path],
                row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    pub fn list_all_projected(&self) -> Result<Vec<MemoListItem>> {
        self.query_items(&format!("SELECT {LIST_COLUMNS} FROM memo_cache {ORDER_NEWEST_FIRST}"), Vec::new())
    }

    /// One page of memos created in `[start_ms, end_ms)`, newest first.
    pub fn list_paged_by_month_range(
        &self,
        start_ms: i64,
        end_ms: i64,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<MemoListItem>> {
        let sql = format!(
            "SELECT {LIST_COLUMNS} FROM memo_cache
             WHERE created_at_ms >= ?1 AND created_at_ms < ?2
             {ORDER_NEWEST_FIRST} LIMIT ?3 OFFSET ?4"
        );
        self.query_items(
            &sql,
            vec![
                Value::Integer(start_ms),
                Value::Integer(end_ms),
                Value::Integer(limit as i64),
                Value::Integer(offset as i64),
            ],
        )
    }

    /// One page of memos matching every whitespace-separated keyword.
    pub fn list_paged_by_search(&self, query: &str, offset: usize, limit: usize) -> Result<Vec<MemoListItem>> {
        let (where_clause, mut values) = match search::build_search_clause(query) {
            Some((clause, values)) => (format!("WHERE {clause}"), values),
            None => (String::new(), Vec::new()),
        };
        let limit_idx = values.len() + 1;
        let offset_idx = values.len() + 2;
        values.push(Value::Integer(limit as i64));
        values.push(Value::Integer(offset as i64));

        let sql = format!(
            "SELECT {LIST_COLUMNS} FROM memo_cache {where_clause}
             {ORDER_NEWEST_FIRST} LIMIT ?{limit_idx} OFFSET ?{offset_idx}"
        );
        self.query_items(&sql, values)
    }

    /// One page over the whole cache, newest first.
    pub fn list_paged(&self, offset: usize, limit: usize) -> Result<Vec<MemoListItem>> {
        self.list_paged_by_search("", offset, limit)
    }

    pub fn get_oldest_creation_timestamp(&self) -> Result<Option<i64>> {
        let conn = self.lock()?;
        let oldest: Option<i64> =
            conn.query_row("SELECT MIN(created_at_ms) FROM memo_cache", [], |row| row.get(0))?;
        Ok(oldest)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM memo_cache", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn clear(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM memo_cache", [])?;
        Ok(())
    }

    fn query_items(&self, sql: &str, values: Vec<Value>) -> Result<Vec<MemoListItem>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let items = stmt
            .query_map(params_from_iter(values.iter()), row_to_item)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(items)
    }
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<MemoCacheEntry> {
    Ok(MemoCacheEntry {
        path: row.get(0)?,
        display_name: row.get(1)?,
        created_at_ms: row.get(2)?,
        full_text: row.get(3)?,
    })
}

fn row_to_item(row: &Row<'_>) -> rusqlite::Result<MemoListItem> {
    Ok(MemoListItem {
        path: row.get(0)?,
        display_name: row.get(1)?,
        created_at_ms: row.get(2)?,
    })
}
