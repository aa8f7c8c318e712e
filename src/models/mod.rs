// src/models/mod.rs

//! Domain models for the prober.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod outcome;
mod site;
mod snapshot;

// Re-export all public types
pub use config::{
    BusConfig, Config, ConfigErrorPolicy, ConfigOrigin, DatabaseConfig, LoggingConfig,
    ProberConfig,
};
pub use outcome::{
    CLASSIFIED_STATUS, OutcomeKind, ProbeMessage, ProbeOutcome, ProbeRecord, ProbeStatus,
    RegexVerdict, TRANSPORT_FAILURE_STATUS, is_success_class,
};
pub use site::{ProbeConfig, RegexRule, Site};
pub use snapshot::ConfigSnapshot;
