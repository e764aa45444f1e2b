//! Readiness polling against the worker's `/isReady` endpoint.

use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::bridge::RequestBridge;
use crate::bridge::protocol::IS_READY;

/// Pause between two readiness probes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
#[error("worker did not report ready within {timeout:?}")]
pub struct ReadinessTimeout {
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ReadinessProbe {
    bridge: RequestBridge,
    interval: Duration,
}

impl ReadinessProbe {
    pub fn new(bridge: RequestBridge) -> Self {
        Self {
            bridge,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Single liveness check. Any transport or decode failure counts as "not ready".
    pub async fn is_ready(&self) -> bool {
        match self.bridge.call_empty(IS_READY).await {
            Ok(reply) => reply.get("ready") == Some(&Value::Bool(true)),
            Err(e) => {
                tracing::trace!(error = %e, "Readiness probe failed");
                false
            }
        }
    }

    /// Poll until the worker reports ready or `timeout` elapses.
    ///
    /// Never fails before `timeout` has passed. Each probe is cut off at the
    /// deadline, so a worker that accepts connections but never answers cannot
    /// stretch the wait.
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<(), ReadinessTimeout> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut attempts: u32 = 0;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            attempts += 1;
            if let Ok(true) = tokio::time::timeout(remaining, self.is_ready()).await {
                tracing::debug!(
                    attempts,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Worker ready"
                );
                return Ok(());
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            tokio::time::sleep(self.interval.min(remaining)).await;
        }

        tracing::warn!(attempts, timeout_ms = timeout.as_millis() as u64, "Worker readiness timed out");
        Err(ReadinessTimeout { timeout })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn probe_for(server: &MockServer) -> ReadinessProbe {
        ReadinessProbe::new(RequestBridge::new(server.uri()).unwrap())
            .with_interval(Duration::from_millis(20))
    }

    fn unused_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    #[tokio::test]
    async fn ready_true_is_ready() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/isReady"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ready": true})))
            .mount(&server)
            .await;

        assert!(probe_for(&server).is_ready().await);
    }

    #[tokio::test]
    async fn ready_false_or_truthy_non_bool_is_not_ready() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/isReady"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ready": "yes"})))
            .mount(&server)
            .await;

        assert!(!probe_for(&server).is_ready().await);
    }

    #[tokio::test]
    async fn garbage_body_is_not_ready() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        assert!(!probe_for(&server).is_ready().await);
    }

    #[tokio::test]
    async fn unreachable_worker_is_not_ready() {
        let bridge = RequestBridge::loopback("127.0.0.1", unused_port()).unwrap();
        assert!(!ReadinessProbe::new(bridge).is_ready().await);
    }

    #[tokio::test]
    async fn wait_returns_once_worker_turns_ready() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/isReady"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ready": false})))
            .up_to_n_times(3)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/isReady"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ready": true})))
            .mount(&server)
            .await;

        probe_for(&server)
            .wait_until_ready(Duration::from_secs(5))
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 4);
    }

    #[tokio::test]
    async fn wait_times_out_no_earlier_than_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/isReady"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ready": false})))
            .mount(&server)
            .await;

        let timeout = Duration::from_millis(300);
        let started = std::time::Instant::now();
        let err = probe_for(&server)
            .wait_until_ready(timeout)
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert_eq!(err.timeout, timeout);
        assert!(elapsed >= timeout, "returned after {elapsed:?}");
        assert!(elapsed < timeout + Duration::from_secs(1), "returned after {elapsed:?}");
    }

    #[tokio::test]
    async fn wait_times_out_when_nothing_listens() {
        let bridge = RequestBridge::loopback("127.0.0.1", unused_port()).unwrap();
        let probe = ReadinessProbe::new(bridge).with_interval(Duration::from_millis(10));

        let timeout = Duration::from_millis(150);
        let started = std::time::Instant::now();
        assert!(probe.wait_until_ready(timeout).await.is_err());
        assert!(started.elapsed() >= timeout);
    }

    #[tokio::test]
    async fn hung_worker_does_not_stretch_the_wait() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/isReady"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ready": true}))
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;

        let timeout = Duration::from_millis(200);
        let started = std::time::Instant::now();
        assert!(probe_for(&server).wait_until_ready(timeout).await.is_err());
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
