//! Service layer for the prober application.
//!
//! This module contains the business logic for:
//! - Body classification (`RegexClassifier`)
//! - Probing a single site (`Prober`)
//! - Publishing outcomes to the bus (`ResultPublisher`)
//! - Periodic probe cycles (`Scheduler`)
//! - Persisting consumed outcomes (`ResultConsumer`)

mod classifier;
mod consumer;
mod prober;
mod publisher;
mod scheduler;

pub use classifier::{Classification, RegexClassifier, check_pattern};
pub use consumer::{ConsumerStats, Disposition, ResultConsumer};
pub use prober::Prober;
pub use publisher::{PublishStats, ResultPublisher};
pub use scheduler::{CycleReport, Scheduler};
