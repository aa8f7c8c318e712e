// src/services/prober.rs

//! Site prober service.
//!
//! Issues one GET per site over the cycle's shared client, classifies the
//! body on a 200, and publishes the outcome.

use std::sync::Arc;

use reqwest::Client;

use crate::models::{CLASSIFIED_STATUS, ProbeConfig, ProbeOutcome, ProbeStatus};
use crate::services::ResultPublisher;

/// Prober bound to one cycle's HTTP client.
#[derive(Clone)]
pub struct Prober {
    client: Client,
    publisher: Arc<ResultPublisher>,
}

impl Prober {
    pub fn new(client: Client, publisher: Arc<ResultPublisher>) -> Self {
        Self { client, publisher }
    }

    /// Probe a site and publish the outcome.
    ///
    /// A publish failure is logged and counted by the publisher; the outcome
    /// is returned either way.
    pub async fn probe(&self, config: &ProbeConfig) -> ProbeOutcome {
        let outcome = self.observe(config).await;

        if let Err(e) = self.publisher.publish(&outcome).await {
            log::warn!(
                "Dropped outcome for site {} (status {}): {}",
                outcome.site_id,
                outcome.status,
                e
            );
        }

        outcome
    }

    /// Fetch and classify a site without publishing.
    pub async fn observe(&self, config: &ProbeConfig) -> ProbeOutcome {
        let site = &config.site;
        log::debug!("Probing site {} ({})", site.id, site.url);

        let response = match self.client.get(&site.url).send().await {
            Ok(response) => response,
            Err(e) => {
                log::warn!("Site {} ({}) unreachable: {}", site.id, site.url, e);
                return ProbeOutcome::transport_failure(site.id, e);
            }
        };

        let status = response.status().as_u16();
        if status != CLASSIFIED_STATUS {
            log::info!("Site {} ({}) returned {}", site.id, site.url, status);
            return ProbeOutcome::unclassified(site.id, status);
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                log::warn!("Site {} ({}) body read failed: {}", site.id, site.url, e);
                return ProbeOutcome::transport_failure(site.id, e);
            }
        };

        let classification = config.classifier().classify(&body);
        ProbeOutcome {
            site_id: site.id,
            status: ProbeStatus::Responded(status),
            regex_verdicts: classification.verdicts,
            invalid_rules: classification.invalid_rules,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::bus::MemoryBus;
    use crate::models::{
        BusConfig, OutcomeKind, ProbeMessage, ProberConfig, RegexRule, RegexVerdict, Site,
    };
    use crate::testing::{TestServer, unreachable_url};
    use crate::utils::http::create_async_client;

    const TOPIC: &str = "probe-results";

    fn prober(bus: &MemoryBus) -> Prober {
        let publisher = Arc::new(ResultPublisher::new(
            Arc::new(bus.clone()),
            &BusConfig::default(),
        ));
        let client = create_async_client(&ProberConfig::default()).unwrap();
        Prober::new(client, publisher)
    }

    fn config(url: String, patterns: &[(i32, &str)]) -> ProbeConfig {
        let rules = patterns
            .iter()
            .map(|(id, pattern)| RegexRule {
                id: *id,
                site_id: 1,
                pattern: pattern.to_string(),
            })
            .collect();
        ProbeConfig::new(Site { id: 1, url }, rules)
    }

    fn published(bus: &MemoryBus) -> Vec<ProbeMessage> {
        bus.drain(TOPIC)
            .iter()
            .map(|d| ProbeMessage::decode(&d.payload).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_ok_body_is_classified_and_published() {
        let server = TestServer::start(200, "status: OK build#123").await;
        let bus = MemoryBus::new();

        let outcome = prober(&bus)
            .probe(&config(server.url("/"), &[(1, "OK")]))
            .await;

        assert_eq!(outcome.status, ProbeStatus::Responded(200));
        assert_eq!(
            outcome.regex_verdicts,
            vec![RegexVerdict {
                regex_id: 1,
                found: true
            }]
        );
        assert_eq!(
            published(&bus),
            vec![ProbeMessage {
                site_id: 1,
                status_code: 200,
                regex_results: vec![(1, true)],
            }]
        );
    }

    #[tokio::test]
    async fn test_one_verdict_per_rule_with_distinct_ids() {
        let server = TestServer::start(200, "<h1>Welcome</h1>").await;
        let bus = MemoryBus::new();

        let outcome = prober(&bus)
            .observe(&config(
                server.url("/"),
                &[(4, "Welcome"), (5, "Goodbye"), (6, "(broken")],
            ))
            .await;

        let ids: Vec<i32> = outcome.regex_verdicts.iter().map(|v| v.regex_id).collect();
        assert_eq!(ids, vec![4, 5, 6]);
        assert_eq!(
            outcome.kind(),
            OutcomeKind::ClassificationPartial {
                invalid_rules: vec![6]
            }
        );
        assert!(bus.drain(TOPIC).is_empty());
    }

    #[tokio::test]
    async fn test_server_error_is_not_classified() {
        let server = TestServer::start(500, "status: OK").await;
        let bus = MemoryBus::new();

        let outcome = prober(&bus)
            .probe(&config(server.url("/"), &[(1, "OK")]))
            .await;

        assert_eq!(outcome.kind(), OutcomeKind::NonSuccess(500));
        assert!(outcome.regex_verdicts.is_empty());
        assert_eq!(
            published(&bus),
            vec![ProbeMessage {
                site_id: 1,
                status_code: 500,
                regex_results: Vec::new(),
            }]
        );
    }

    #[tokio::test]
    async fn test_connection_refused_publishes_sentinel() {
        let bus = MemoryBus::new();

        let outcome = prober(&bus)
            .probe(&config(unreachable_url().await, &[(1, "OK")]))
            .await;

        assert_eq!(outcome.kind(), OutcomeKind::TransportFailure);
        assert!(outcome.error.is_some());
        assert_eq!(
            published(&bus),
            vec![ProbeMessage {
                site_id: 1,
                status_code: -1,
                regex_results: Vec::new(),
            }]
        );
    }

    #[tokio::test]
    async fn test_timeout_is_a_transport_failure() {
        let server =
            TestServer::start_with_delay(200, "late", Duration::from_millis(1500)).await;
        let bus = MemoryBus::new();
        let publisher = Arc::new(ResultPublisher::new(
            Arc::new(bus.clone()),
            &BusConfig::default(),
        ));
        let client = Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();

        let outcome = Prober::new(client, publisher)
            .probe(&config(server.url("/"), &[(1, "late")]))
            .await;

        assert_eq!(outcome.status, ProbeStatus::TransportFailure);
        assert!(outcome.regex_verdicts.is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_still_returns_outcome() {
        let server = TestServer::start(204, "").await;
        let bus = MemoryBus::new();
        bus.close(TOPIC);
        let publisher = Arc::new(ResultPublisher::new(
            Arc::new(bus.clone()),
            &BusConfig::default(),
        ));
        let client = create_async_client(&ProberConfig::default()).unwrap();

        let outcome = Prober::new(client, Arc::clone(&publisher))
            .probe(&config(server.url("/"), &[]))
            .await;

        assert_eq!(outcome.status, ProbeStatus::Responded(204));
        assert_eq!(publisher.stats().dropped(), 1);
    }
}
