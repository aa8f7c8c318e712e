//! In-memory result store.
//!
//! Rows are kept in the same shape as the Postgres tables, which makes the
//! store usable for embedding and for asserting on consumer behavior.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::ProbeRecord;
use crate::storage::ResultStore;

/// Row of `probe_results`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResultRow {
    pub associated_site_id: i32,
    pub timestamp: DateTime<Utc>,
    pub up: bool,
}

/// Row of `regex_probe_results`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegexResultRow {
    pub associated_site_id: i32,
    pub associated_regex_id: i32,
    pub timestamp: DateTime<Utc>,
    pub found: bool,
}

#[derive(Default)]
struct Tables {
    probe_results: Vec<ProbeResultRow>,
    regex_results: Vec<RegexResultRow>,
}

/// Result store holding rows in memory.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn probe_results(&self) -> Vec<ProbeResultRow> {
        self.lock().probe_results.clone()
    }

    pub fn regex_results(&self) -> Vec<RegexResultRow> {
        self.lock().regex_results.clone()
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn persist(&self, record: &ProbeRecord) -> Result<()> {
        // One lock for both tables keeps the write atomic.
        let mut tables = self.lock();
        tables.probe_results.push(ProbeResultRow {
            associated_site_id: record.site_id,
            timestamp: record.recorded_at,
            up: record.up,
        });
        let rows = record
            .regex_results
            .iter()
            .map(|(regex_id, found)| RegexResultRow {
                associated_site_id: record.site_id,
                associated_regex_id: *regex_id,
                timestamp: record.recorded_at,
                found: *found,
            });
        tables.regex_results.extend(rows);
        Ok(())
    }
}
