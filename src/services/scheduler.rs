// src/services/scheduler.rs

//! Periodic probe scheduler.
//!
//! A cycle loads a fresh snapshot, builds one HTTP client, fans out one
//! probe per site with at most `max_concurrent` in flight, and waits for
//! every probe to finish. Only then does the scheduler sleep, so cycles
//! never overlap and the effective period is cycle time plus interval.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};

use crate::error::Result;
use crate::models::{Config, ConfigErrorPolicy, ConfigSnapshot, OutcomeKind, ProbeOutcome};
use crate::services::{Prober, ResultPublisher};
use crate::storage::ConfigSource;
use crate::utils::http::create_async_client;

/// Summary of one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Probes submitted (one per site in the snapshot)
    pub sites: usize,
    /// Probes that completed, whatever their outcome
    pub completed: usize,
    pub success: usize,
    pub partial: usize,
    pub non_success: usize,
    pub transport_failures: usize,
    /// Probe tasks that panicked
    pub task_failures: usize,
    /// Outcomes the publisher could not hand to the bus
    pub publish_drops: u64,
    pub elapsed: Duration,
}

impl CycleReport {
    fn record(&mut self, outcome: &ProbeOutcome) {
        self.completed += 1;
        match outcome.kind() {
            OutcomeKind::Success => self.success += 1,
            OutcomeKind::ClassificationPartial { .. } => self.partial += 1,
            OutcomeKind::NonSuccess(_) => self.non_success += 1,
            OutcomeKind::TransportFailure => self.transport_failures += 1,
        }
    }

    fn log(&self) {
        log::info!(
            "Cycle complete in {:.2?}: {} sites, {} ok, {} partial, {} non-200, {} unreachable",
            self.elapsed,
            self.sites,
            self.success,
            self.partial,
            self.non_success,
            self.transport_failures
        );
        if self.task_failures > 0 || self.publish_drops > 0 {
            log::warn!(
                "Cycle had {} task failures and {} publish drops",
                self.task_failures,
                self.publish_drops
            );
        }
    }
}

/// Drives probing cycles.
pub struct Scheduler {
    config: Arc<Config>,
    source: Arc<dyn ConfigSource>,
    publisher: Arc<ResultPublisher>,
}

impl Scheduler {
    pub fn new(
        config: Arc<Config>,
        source: Arc<dyn ConfigSource>,
        publisher: Arc<ResultPublisher>,
    ) -> Self {
        Self {
            config,
            source,
            publisher,
        }
    }

    /// Run cycles forever, sleeping `interval` after each one.
    ///
    /// Returns only with an error: a failed snapshot load under the `abort`
    /// policy. Dropping the future cancels the loop at its next await.
    pub async fn run(&self, interval: Duration) -> Result<()> {
        log::info!(
            "Scheduler starting: interval {:?}, concurrency {}, topic '{}'",
            interval,
            self.config.prober.max_concurrent,
            self.publisher.topic()
        );

        loop {
            match self.run_cycle().await {
                Ok(report) => report.log(),
                Err(e) => match self.config.prober.on_config_error {
                    ConfigErrorPolicy::Abort => {
                        log::error!("Cycle aborted: {}", e);
                        return Err(e);
                    }
                    ConfigErrorPolicy::Skip => {
                        log::error!("Cycle skipped: {}", e);
                    }
                },
            }

            tokio::time::sleep(interval).await;
        }
    }

    /// Execute a single cycle and wait for all of its probes.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let started = Instant::now();

        let snapshot = ConfigSnapshot::load(self.source.as_ref()).await?;
        log::info!(
            "Loaded {} sites with {} rules at {}",
            snapshot.site_count(),
            snapshot.rule_count(),
            snapshot.loaded_at().format("%H:%M:%S")
        );

        let client = create_async_client(&self.config.prober)?;
        let prober = Prober::new(client, Arc::clone(&self.publisher));
        let concurrency = self.config.prober.max_concurrent.max(1);
        let dropped_before = self.publisher.stats().dropped();

        let mut report = CycleReport {
            sites: snapshot.site_count(),
            ..CycleReport::default()
        };

        // Tasks are spawned lazily, so at most `concurrency` exist at once.
        let mut probes = stream::iter(snapshot.configs().iter().cloned())
            .map(|config| {
                let prober = prober.clone();
                let site_id = config.site.id;
                let handle = tokio::spawn(async move { prober.probe(&config).await });
                async move { (site_id, handle.await) }
            })
            .buffer_unordered(concurrency);

        while let Some((site_id, joined)) = probes.next().await {
            match joined {
                Ok(outcome) => report.record(&outcome),
                Err(e) => {
                    report.task_failures += 1;
                    log::error!("Probe task for site {} failed: {}", site_id, e);
                }
            }
        }

        report.publish_drops = self.publisher.stats().dropped() - dropped_before;
        report.elapsed = started.elapsed();
        Ok(report)
    }
}
