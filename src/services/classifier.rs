// src/services/classifier.rs

//! Regex content classifier.
//!
//! Each rule is compiled independently so that one bad pattern never
//! prevents the others from being evaluated.

use regex::Regex;

use crate::models::{RegexRule, RegexVerdict};

#[derive(Debug, Clone)]
enum CompiledRule {
    Valid { id: i32, regex: Regex },
    Invalid { id: i32 },
}

/// Verdicts for one body plus the rules that could not be evaluated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    /// One verdict per rule, in rule order
    pub verdicts: Vec<RegexVerdict>,
    /// Ids of rules whose pattern failed to compile
    pub invalid_rules: Vec<i32>,
}

/// Compiled set of rules for a single site.
#[derive(Debug, Clone, Default)]
pub struct RegexClassifier {
    rules: Vec<CompiledRule>,
}

impl RegexClassifier {
    /// Compile every rule, keeping ill-formed patterns as always-not-found.
    pub fn compile(rules: &[RegexRule]) -> Self {
        let rules = rules
            .iter()
            .map(|rule| match Regex::new(&rule.pattern) {
                Ok(regex) => CompiledRule::Valid { id: rule.id, regex },
                Err(e) => {
                    log::warn!(
                        "Rule {} for site {} has an invalid pattern {:?}: {}",
                        rule.id,
                        rule.site_id,
                        rule.pattern,
                        e
                    );
                    CompiledRule::Invalid { id: rule.id }
                }
            })
            .collect();

        Self { rules }
    }

    /// Search every pattern anywhere in `body`.
    pub fn classify(&self, body: &str) -> Classification {
        let mut classification = Classification {
            verdicts: Vec::with_capacity(self.rules.len()),
            invalid_rules: Vec::new(),
        };

        for rule in &self.rules {
            let verdict = match rule {
                CompiledRule::Valid { id, regex } => RegexVerdict {
                    regex_id: *id,
                    found: regex.is_match(body),
                },
                CompiledRule::Invalid { id } => {
                    classification.invalid_rules.push(*id);
                    RegexVerdict {
                        regex_id: *id,
                        found: false,
                    }
                }
            };
            classification.verdicts.push(verdict);
        }

        classification
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Check a pattern without building a classifier.
pub fn check_pattern(pattern: &str) -> std::result::Result<(), regex::Error> {
    Regex::new(pattern).map(|_| ())
}
