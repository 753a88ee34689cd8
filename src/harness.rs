//! The oracle: selects probes for a target, runs them strictly in order,
//! and converts every outcome into a `TestResult`.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::domain::{ProtocolVersion, Severity, TestResult};
use crate::engine::slot::SlotCache;
use crate::engine::ProbeContext;
use crate::probes::{
    availability_dates, availability_timeslots, availability_unified, availability_variants,
    booking, catalog, reservation, Probe,
};

const CALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Availability,
    Reservation,
    Booking,
    Catalog,
}

impl Target {
    pub fn heading(&self) -> &'static str {
        match self {
            Target::Availability => "AVAILABILITY TESTS",
            Target::Reservation => "RESERVATION TESTS",
            Target::Booking => "BOOKING TESTS",
            Target::Catalog => "PRODUCT CATALOG",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub api_url: String,
    pub api_key: String,
    pub product_id: String,
    pub version: ProtocolVersion,
    pub timeslots: bool,
}

pub struct Harness {
    ctx: ProbeContext,
}

impl Harness {
    pub fn new(config: RunnerConfig) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(CALL_TIMEOUT)
            .build()
            .map_err(|err| format!("Failed to build HTTP client: {err}"))?;
        Ok(Harness {
            ctx: ProbeContext {
                client,
                api_url: config.api_url,
                api_key: config.api_key,
                product_id: config.product_id,
                version: config.version,
                timeslots: config.timeslots,
                slot_cache: SlotCache::default(),
            },
        })
    }

    /// The probe queue for a target. `Availability` expands into the base
    /// family plus exactly one of the timeslot/variant families on v1 — a
    /// product is statically one or the other, never both.
    pub fn probes_for(&self, target: Target) -> Vec<Probe> {
        match (target, self.ctx.version) {
            (Target::Availability, ProtocolVersion::V1) => {
                let mut probes = availability_dates::probes();
                if self.ctx.timeslots {
                    probes.extend(availability_timeslots::probes());
                } else {
                    probes.extend(availability_variants::probes());
                }
                probes
            }
            (Target::Availability, ProtocolVersion::V2) => availability_unified::probes(),
            (Target::Reservation, version) => reservation::probes(version),
            (Target::Booking, _) => booking::probes(),
            (Target::Catalog, version) => catalog::probes(version),
        }
    }

    /// Runs every probe for the target sequentially. One probe's failure
    /// never aborts the queue: the result set always has one entry per
    /// probe, in declaration order.
    pub async fn run(&self, target: Target) -> Vec<TestResult> {
        let probes = self.probes_for(target);
        let mut results = Vec::with_capacity(probes.len());
        for probe in probes {
            debug!(title = probe.title, "running probe");
            let started = Instant::now();
            let outcome = (probe.run)(&self.ctx).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            let mut result = match outcome {
                Ok(result) => result,
                Err(err) => {
                    let transport = err.is_transport();
                    let (message, response) = err.take_response();
                    TestResult {
                        title: String::new(),
                        severity: Severity::Fail,
                        message: Some(if transport {
                            format!("Transport failure: {message}")
                        } else {
                            message
                        }),
                        duration_ms: 0,
                        response,
                    }
                }
            };
            result.title = probe.title.to_string();
            result.duration_ms = duration_ms;
            results.push(result);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock;

    async fn harness_for(
        addr: std::net::SocketAddr,
        product_id: &str,
        version: ProtocolVersion,
        timeslots: bool,
    ) -> Harness {
        Harness::new(RunnerConfig {
            api_url: format!("http://{addr}"),
            api_key: "secret".to_string(),
            product_id: product_id.to_string(),
            version,
            timeslots,
        })
        .expect("harness")
    }

    fn fail_summary(results: &[TestResult]) -> String {
        results
            .iter()
            .filter(|r| r.is_fail())
            .map(|r| format!("{}: {}", r.title, r.message.as_deref().unwrap_or("")))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[tokio::test]
    async fn v2_run_against_mock_is_clean_for_plain_product() {
        let (addr, _handle) = mock::spawn("127.0.0.1:0", "secret").await.expect("mock");
        let harness = harness_for(addr, "A500-FX", ProtocolVersion::V2, false).await;

        for target in [
            Target::Availability,
            Target::Reservation,
            Target::Booking,
            Target::Catalog,
        ] {
            let results = harness.run(target).await;
            assert!(!results.is_empty());
            assert!(
                results.iter().all(|r| !r.is_fail()),
                "unexpected failures in {target:?}:\n{}",
                fail_summary(&results)
            );
        }
    }

    #[tokio::test]
    async fn v1_run_against_mock_is_clean_for_timeslot_product() {
        let (addr, _handle) = mock::spawn("127.0.0.1:0", "secret").await.expect("mock");
        let harness = harness_for(addr, "A300-FX", ProtocolVersion::V1, true).await;

        for target in [Target::Availability, Target::Reservation, Target::Booking] {
            let results = harness.run(target).await;
            assert!(
                results.iter().all(|r| !r.is_fail()),
                "unexpected failures in {target:?}:\n{}",
                fail_summary(&results)
            );
        }
    }

    #[tokio::test]
    async fn v2_run_is_clean_for_priced_timeslot_product() {
        let (addr, _handle) = mock::spawn("127.0.0.1:0", "secret").await.expect("mock");
        let harness = harness_for(addr, "A400-FX", ProtocolVersion::V2, true).await;

        for target in [Target::Availability, Target::Reservation, Target::Booking] {
            let results = harness.run(target).await;
            assert!(
                results.iter().all(|r| !r.is_fail()),
                "unexpected failures in {target:?}:\n{}",
                fail_summary(&results)
            );
        }
    }

    #[tokio::test]
    async fn v2_booking_is_clean_for_pdf_barcode_product() {
        let (addr, _handle) = mock::spawn("127.0.0.1:0", "secret").await.expect("mock");
        let harness = harness_for(addr, "A550-FX", ProtocolVersion::V2, false).await;

        let results = harness.run(Target::Booking).await;
        assert!(
            results.iter().all(|r| !r.is_fail()),
            "unexpected failures:\n{}",
            fail_summary(&results)
        );
    }

    #[tokio::test]
    async fn non_refundable_product_reports_cancellation_skip_not_failure() {
        let (addr, _handle) = mock::spawn("127.0.0.1:0", "secret").await.expect("mock");
        let harness = harness_for(addr, "A600-FX", ProtocolVersion::V2, false).await;

        let results = harness.run(Target::Booking).await;
        let cancellation = results
            .iter()
            .find(|r| r.title == "Perform booking that will be cancelled")
            .expect("cancellation probe ran");
        assert!(cancellation.is_warning(), "{:?}", cancellation.message);
    }

    #[tokio::test]
    async fn unknown_product_still_yields_one_result_per_probe() {
        let (addr, _handle) = mock::spawn("127.0.0.1:0", "secret").await.expect("mock");
        let harness = harness_for(addr, "NO-SUCH-PRODUCT", ProtocolVersion::V2, false).await;

        let expected = harness.probes_for(Target::Availability).len();
        let results = harness.run(Target::Availability).await;
        assert_eq!(results.len(), expected);
        assert!(results.iter().any(|r| r.is_fail()));
    }

    #[tokio::test]
    async fn unreachable_server_reports_transport_failures_for_every_probe() {
        // Bind a listener and drop it so the port is closed.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let harness = harness_for(addr, "A500-FX", ProtocolVersion::V2, false).await;
        let expected = harness.probes_for(Target::Catalog).len();
        let results = harness.run(Target::Catalog).await;
        assert_eq!(results.len(), expected);
        for result in &results {
            assert!(result.is_fail());
            assert!(
                result
                    .message
                    .as_deref()
                    .unwrap_or("")
                    .starts_with("Transport failure:"),
                "{:?}",
                result.message
            );
        }
    }

    #[tokio::test]
    async fn wrong_api_key_fails_the_auth_sensitive_probes() {
        let (addr, _handle) = mock::spawn("127.0.0.1:0", "secret").await.expect("mock");
        let harness = Harness::new(RunnerConfig {
            api_url: format!("http://{addr}"),
            api_key: "wrong".to_string(),
            product_id: "A500-FX".to_string(),
            version: ProtocolVersion::V2,
            timeslots: false,
        })
        .expect("harness");

        let results = harness.run(Target::Catalog).await;
        assert!(results.iter().any(|r| r.is_fail()));
    }
}
