//! Issuer URL reachability probing.
//!
//! A probe answers one question: does anything respond over HTTP at this
//! URL? Any HTTP status counts as reachable, including 4xx and 5xx; an
//! error page still proves the issuer host exists. Transient failures
//! (timeouts, connection refusals) get a bounded retry with jittered
//! backoff before the probe gives up.

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument, warn};

use crate::config::PipelineConfig;
use crate::error::PipelineError;

const USER_AGENT: &str = concat!("certverify/", env!("CARGO_PKG_VERSION"));

/// Outcome of probing one URL.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    /// Whether any HTTP response came back.
    pub reachable: bool,
    /// What happened, suitable for the verification message.
    pub detail: String,
}

/// HTTP reachability prober with aggressive timeouts.
#[derive(Debug, Clone)]
pub struct ReachabilityProbe {
    client: reqwest::Client,
    retries: u32,
    backoff: Duration,
}

impl ReachabilityProbe {
    /// Build a probe from the pipeline configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(config.probe_timeout)
            .connect_timeout(config.probe_timeout.min(Duration::from_secs(3)))
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| PipelineError::Config {
                message: format!("failed to build probe HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            retries: config.probe_retries,
            backoff: config.probe_backoff,
        })
    }

    /// Probe a URL for reachability.
    ///
    /// Infallible by design; every failure mode folds into an unreachable
    /// outcome with a detail string.
    #[instrument(skip(self))]
    pub async fn probe(&self, url: &str) -> ProbeOutcome {
        let mut last_detail = String::new();

        for attempt in 0..=self.retries {
            if attempt > 0 {
                let jitter = rand::thread_rng().gen_range(0..=self.backoff.as_millis() as u64);
                tokio::time::sleep(self.backoff + Duration::from_millis(jitter)).await;
                debug!(attempt, url, "Retrying issuer probe");
            }

            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    debug!(url, status = %status, "Issuer URL responded");
                    return ProbeOutcome {
                        reachable: true,
                        detail: format!("issuer URL responded with HTTP {status}"),
                    };
                },
                Err(e) if e.is_timeout() || e.is_connect() => {
                    warn!(url, attempt, error = %e, "Transient probe failure");
                    last_detail = if e.is_timeout() {
                        "issuer URL timed out".to_string()
                    } else {
                        "connection to issuer URL failed".to_string()
                    };
                },
                Err(e) => {
                    warn!(url, error = %e, "Probe failed");
                    return ProbeOutcome {
                        reachable: false,
                        detail: format!("issuer URL could not be probed: {e}"),
                    };
                },
            }
        }

        ProbeOutcome {
            reachable: false,
            detail: last_detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    use super::*;

    /// Minimal one-shot HTTP server on a random local port.
    async fn serve_once(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let response = format!("{status_line}\r\ncontent-length: 0\r\n\r\n");
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{addr}/verify/ABC123")
    }

    fn fast_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.probe_timeout = Duration::from_millis(500);
        config.probe_retries = 0;
        config.probe_backoff = Duration::from_millis(10);
        config
    }

    #[tokio::test]
    async fn test_ok_response_is_reachable() {
        let url = serve_once("HTTP/1.1 200 OK").await;
        let probe = ReachabilityProbe::new(&fast_config()).unwrap();
        let outcome = probe.probe(&url).await;
        assert!(outcome.reachable);
        assert!(outcome.detail.contains("200"));
    }

    #[tokio::test]
    async fn test_error_status_still_counts_as_reachable() {
        let url = serve_once("HTTP/1.1 404 Not Found").await;
        let probe = ReachabilityProbe::new(&fast_config()).unwrap();
        let outcome = probe.probe(&url).await;
        assert!(outcome.reachable);
        assert!(outcome.detail.contains("404"));
    }

    #[tokio::test]
    async fn test_transient_failure_retried_then_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let attempts = Arc::new(AtomicUsize::new(0));
        let served = Arc::clone(&attempts);
        tokio::spawn(async move {
            // First connection gets no response and times out on the client;
            // the retry is served normally.
            let (first, _) = listener.accept().await.unwrap();
            served.fetch_add(1, Ordering::SeqCst);
            let (mut second, _) = listener.accept().await.unwrap();
            served.fetch_add(1, Ordering::SeqCst);
            let _ = second
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n")
                .await;
            drop(first);
        });

        let mut config = PipelineConfig::default();
        config.probe_timeout = Duration::from_millis(300);
        config.probe_retries = 1;
        config.probe_backoff = Duration::from_millis(50);
        let probe = ReachabilityProbe::new(&config).unwrap();

        let outcome = probe.probe(&format!("http://{addr}/verify")).await;
        assert!(outcome.reachable);
        assert!(outcome.detail.contains("200"));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_refused_connection_is_unreachable() {
        // Bind then drop so the port is very likely closed.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let probe = ReachabilityProbe::new(&fast_config()).unwrap();
        let outcome = probe.probe(&format!("http://{addr}/verify")).await;
        assert!(!outcome.reachable);
        assert!(!outcome.detail.is_empty());
    }
}
