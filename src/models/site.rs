// src/models/site.rs

//! Site and content rule records.

use serde::{Deserialize, Serialize};

use crate::services::RegexClassifier;

/// A website to probe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Site {
    /// Site identifier in the config store
    pub id: i32,

    /// URL requested on every cycle
    pub url: String,
}

/// A content pattern that must be checked on a site's response body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegexRule {
    /// Rule identifier in the config store
    pub id: i32,

    /// Site this rule belongs to
    pub site_id: i32,

    /// Regular expression searched anywhere in the body
    pub pattern: String,
}

/// Everything needed to probe one site during one cycle.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub site: Site,
    pub rules: Vec<RegexRule>,
    classifier: RegexClassifier,
}

impl ProbeConfig {
    /// Join a site with its rules, compiling the patterns once for the cycle.
    pub fn new(site: Site, rules: Vec<RegexRule>) -> Self {
        let classifier = RegexClassifier::compile(&rules);
        Self {
            site,
            rules,
            classifier,
        }
    }

    pub fn classifier(&self) -> &RegexClassifier {
        &self.classifier
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}
