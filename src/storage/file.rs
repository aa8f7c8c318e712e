//! TOML file config source.
//!
//! The file is re-read on every `load_sites` call, so edits take effect on
//! the next cycle.
//!
//! ```toml
//! [[sites]]
//! id = 1
//! url = "https://example.com"
//!
//! [[rules]]
//! id = 1
//! site_id = 1
//! pattern = "Example Domain"
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{RegexRule, Site};
use crate::services::check_pattern;
use crate::storage::ConfigSource;

/// Contents of a sites file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SitesFile {
    #[serde(default)]
    pub sites: Vec<Site>,

    #[serde(default)]
    pub rules: Vec<RegexRule>,
}

impl SitesFile {
    /// Parse a sites file from disk.
    pub async fn read(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Ok(toml::from_str(&content)?)
    }

    /// Check URLs, patterns and rule ownership.
    pub fn validate(&self) -> Result<()> {
        for site in &self.sites {
            url::Url::parse(&site.url).map_err(|e| {
                AppError::validation(format!(
                    "site {} has invalid url {:?}: {e}",
                    site.id, site.url
                ))
            })?;
        }
        for rule in &self.rules {
            if !self.sites.iter().any(|s| s.id == rule.site_id) {
                return Err(AppError::validation(format!(
                    "rule {} references unknown site {}",
                    rule.id, rule.site_id
                )));
            }
            check_pattern(&rule.pattern).map_err(|e| {
                AppError::validation(format!("rule {} has invalid pattern: {e}", rule.id))
            })?;
        }
        Ok(())
    }
}

/// Config source backed by a TOML file.
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigSource for FileConfigSource {
    async fn load_sites(&self) -> Result<Vec<Site>> {
        Ok(SitesFile::read(&self.path).await?.sites)
    }

    async fn load_rules(&self, site_id: i32) -> Result<Vec<RegexRule>> {
        let file = SitesFile::read(&self.path).await?;
        Ok(file
            .rules
            .into_iter()
            .filter(|rule| rule.site_id == site_id)
            .collect())
    }
}
