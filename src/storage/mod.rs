//! Storage abstractions for site configuration and probe results.
//!
//! Two seams live here:
//! - `ConfigSource`: read-only sites and regex rules, re-read every cycle
//! - `ResultStore`: append-only probe and regex results
//!
//! ## Result Tables
//!
//! ```text
//! probe_results        (associated_site_id, timestamp, up)
//! regex_probe_results  (associated_site_id, associated_regex_id, timestamp, found)
//! ```

pub mod file;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ProbeRecord, RegexRule, Site};

// Re-export for convenience
pub use file::{FileConfigSource, SitesFile};
pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStore;

/// Durable source of sites and their rules.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// All sites, in source order.
    async fn load_sites(&self) -> Result<Vec<Site>>;

    /// Rules of one site, in source order.
    async fn load_rules(&self, site_id: i32) -> Result<Vec<RegexRule>>;
}

/// Append-only writer for consumed results.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Write one probe row and its regex rows as a single transaction.
    async fn persist(&self, record: &ProbeRecord) -> Result<()>;
}
