// src/models/outcome.rs

//! Probe outcomes, their wire message, and the persisted record.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Wire status code used when no HTTP response was received.
pub const TRANSPORT_FAILURE_STATUS: i32 = -1;

/// The only status whose body is classified.
pub const CLASSIFIED_STATUS: u16 = 200;

/// Whether a wire status code counts as "up" (2xx).
pub fn is_success_class(status_code: i32) -> bool {
    (200..=299).contains(&status_code)
}

/// HTTP-level result of a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    /// The server answered with this status code
    Responded(u16),
    /// DNS, TLS, connect, timeout or body read failure
    TransportFailure,
}

impl ProbeStatus {
    /// Status code as carried on the wire.
    pub fn code(self) -> i32 {
        match self {
            ProbeStatus::Responded(code) => i32::from(code),
            ProbeStatus::TransportFailure => TRANSPORT_FAILURE_STATUS,
        }
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeStatus::Responded(code) => write!(f, "{code}"),
            ProbeStatus::TransportFailure => f.write_str("transport failure"),
        }
    }
}

/// Whether one rule's pattern was found in the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegexVerdict {
    pub regex_id: i32,
    pub found: bool,
}

/// Coarse classification of an outcome, used for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeKind {
    /// 200 with every rule evaluated
    Success,
    /// 200, but some patterns failed to compile and were reported as not found
    ClassificationPartial { invalid_rules: Vec<i32> },
    /// Any status other than 200
    NonSuccess(u16),
    /// No response received
    TransportFailure,
}

/// Result of probing one site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub site_id: i32,
    pub status: ProbeStatus,
    /// One verdict per rule on a 200, otherwise empty
    pub regex_verdicts: Vec<RegexVerdict>,
    /// Rules whose pattern could not be compiled
    pub invalid_rules: Vec<i32>,
    /// Transport error description, if any
    pub error: Option<String>,
}

impl ProbeOutcome {
    /// Outcome for a response that was not classified.
    pub fn unclassified(site_id: i32, status: u16) -> Self {
        Self {
            site_id,
            status: ProbeStatus::Responded(status),
            regex_verdicts: Vec::new(),
            invalid_rules: Vec::new(),
            error: None,
        }
    }

    /// Sentinel outcome for a request that never got a response.
    pub fn transport_failure(site_id: i32, error: impl fmt::Display) -> Self {
        Self {
            site_id,
            status: ProbeStatus::TransportFailure,
            regex_verdicts: Vec::new(),
            invalid_rules: Vec::new(),
            error: Some(error.to_string()),
        }
    }

    pub fn kind(&self) -> OutcomeKind {
        match self.status {
            ProbeStatus::TransportFailure => OutcomeKind::TransportFailure,
            ProbeStatus::Responded(CLASSIFIED_STATUS) if self.invalid_rules.is_empty() => {
                OutcomeKind::Success
            }
            ProbeStatus::Responded(CLASSIFIED_STATUS) => OutcomeKind::ClassificationPartial {
                invalid_rules: self.invalid_rules.clone(),
            },
            ProbeStatus::Responded(code) => OutcomeKind::NonSuccess(code),
        }
    }
}

/// Message published for every outcome.
///
/// Serialized as `{"site_id": 7, "status_code": 200, "regex_results": [[3, true]]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeMessage {
    pub site_id: i32,
    pub status_code: i32,
    pub regex_results: Vec<(i32, bool)>,
}

impl From<&ProbeOutcome> for ProbeMessage {
    fn from(outcome: &ProbeOutcome) -> Self {
        Self {
            site_id: outcome.site_id,
            status_code: outcome.status.code(),
            regex_results: outcome
                .regex_verdicts
                .iter()
                .map(|v| (v.regex_id, v.found))
                .collect(),
        }
    }
}

impl ProbeMessage {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode and validate a payload received from the bus.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| AppError::message(format!("payload is not UTF-8: {e}")))?;
        let message: Self = serde_json::from_str(text).map_err(AppError::message)?;
        message.validate()?;
        Ok(message)
    }

    fn validate(&self) -> Result<()> {
        let status = self.status_code;
        if status != TRANSPORT_FAILURE_STATUS && !(100..=599).contains(&status) {
            return Err(AppError::message(format!(
                "status_code {status} is not an HTTP status or the transport failure sentinel"
            )));
        }
        if status != i32::from(CLASSIFIED_STATUS) && !self.regex_results.is_empty() {
            return Err(AppError::message(format!(
                "status_code {status} carries {} regex results",
                self.regex_results.len()
            )));
        }
        let mut seen = HashSet::new();
        for (regex_id, _) in &self.regex_results {
            if !seen.insert(*regex_id) {
                return Err(AppError::message(format!(
                    "regex id {regex_id} appears more than once"
                )));
            }
        }
        Ok(())
    }

    /// Stamp the message for persistence.
    pub fn into_record(self, recorded_at: DateTime<Utc>) -> ProbeRecord {
        ProbeRecord {
            site_id: self.site_id,
            up: is_success_class(self.status_code),
            recorded_at,
            regex_results: self.regex_results,
        }
    }
}

/// Rows written for one consumed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRecord {
    pub site_id: i32,
    pub up: bool,
    /// Persistence time, not probe time
    pub recorded_at: DateTime<Utc>,
    pub regex_results: Vec<(i32, bool)>,
}
