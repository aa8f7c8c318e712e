// src/models/snapshot.rs

//! Immutable per-cycle view of sites and their rules.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{AppError, Result};
use crate::models::{ProbeConfig, RegexRule, Site};
use crate::storage::ConfigSource;

/// Sites and rules as read at the start of a cycle.
///
/// Every load replaces the previous snapshot entirely; nothing is diffed.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    configs: Vec<Arc<ProbeConfig>>,
    loaded_at: DateTime<Utc>,
}

impl ConfigSnapshot {
    /// Read all sites, then the rules of each site, from a config source.
    pub async fn load(source: &dyn ConfigSource) -> Result<Self> {
        let sites = source.load_sites().await?;
        let mut joined = Vec::with_capacity(sites.len());
        for site in sites {
            let rules = source.load_rules(site.id).await?;
            joined.push((site, rules));
        }
        Self::from_parts(joined)
    }

    /// Build a snapshot from sites already paired with their rules.
    pub fn from_parts(parts: Vec<(Site, Vec<RegexRule>)>) -> Result<Self> {
        let mut site_ids = HashSet::new();
        for (site, rules) in &parts {
            if !site_ids.insert(site.id) {
                return Err(AppError::validation(format!(
                    "site id {} appears more than once",
                    site.id
                )));
            }
            if let Some(rule) = rules.iter().find(|r| r.site_id != site.id) {
                return Err(AppError::validation(format!(
                    "rule {} references site {} but was loaded for site {}",
                    rule.id, rule.site_id, site.id
                )));
            }
        }

        let configs = parts
            .into_iter()
            .map(|(site, rules)| Arc::new(ProbeConfig::new(site, rules)))
            .collect();

        Ok(Self {
            configs,
            loaded_at: Utc::now(),
        })
    }

    pub fn configs(&self) -> &[Arc<ProbeConfig>] {
        &self.configs
    }

    pub fn site_count(&self) -> usize {
        self.configs.len()
    }

    pub fn rule_count(&self) -> usize {
        self.configs.iter().map(|c| c.rule_count()).sum()
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}
