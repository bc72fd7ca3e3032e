//! Issuer verification stage.
//!
//! Verification is three independent checks combined conjunctively: the
//! issuer domain must be in the trusted registry, the issuer URL must
//! respond over HTTP, and a certificate id must be present. The result
//! message enumerates all three so a reviewer can see exactly which check
//! failed.

use std::sync::Arc;

use tracing::instrument;
use url::Url;

use crate::error::PipelineError;
use crate::extraction::normalize_issuer_url;
use crate::probe::ReachabilityProbe;
use crate::registry::TrustedDomainRegistry;
use crate::types::{ExtractionResult, ManualVerificationRequest, VerificationResult};

/// The issuer verification stage.
pub struct VerificationAgent {
    registry: Arc<TrustedDomainRegistry>,
    probe: ReachabilityProbe,
}

impl VerificationAgent {
    /// Create an agent over a shared registry and probe.
    #[must_use]
    pub fn new(registry: Arc<TrustedDomainRegistry>, probe: ReachabilityProbe) -> Self {
        Self { registry, probe }
    }

    /// Verify the issuer named by an extraction result.
    ///
    /// Infallible; missing or malformed data folds into a negative result
    /// with an explanatory message.
    #[instrument(skip_all, fields(issuer_url = ?extraction.issuer_url))]
    pub async fn verify(&self, extraction: &ExtractionResult) -> VerificationResult {
        self.check(
            extraction.certificate_id.as_deref(),
            extraction.issuer_url.as_deref(),
        )
        .await
    }

    /// Verify caller-supplied identifiers from the manual path.
    ///
    /// # Errors
    ///
    /// Returns a validation error when either request field is blank.
    #[instrument(skip_all)]
    pub async fn verify_manual(
        &self,
        request: &ManualVerificationRequest,
    ) -> Result<VerificationResult, PipelineError> {
        request.validate()?;
        // The caller did supply a URL; a normalization failure must say so
        // rather than claiming none was available.
        let Some(url) = normalize_issuer_url(&request.issuer_url) else {
            return Ok(VerificationResult {
                is_verified: false,
                trusted_domain: false,
                message: format!(
                    "Issuer URL '{}' is not a valid absolute URL",
                    request.issuer_url.trim()
                ),
            });
        };
        Ok(self
            .check(Some(request.certificate_id.as_str()), Some(&url))
            .await)
    }

    async fn check(
        &self,
        certificate_id: Option<&str>,
        issuer_url: Option<&str>,
    ) -> VerificationResult {
        let Some(issuer_url) = issuer_url else {
            return VerificationResult {
                is_verified: false,
                trusted_domain: false,
                message: "No issuer URL is available; automated issuer verification is not possible"
                    .to_string(),
            };
        };

        let Ok(url) = Url::parse(issuer_url) else {
            return VerificationResult {
                is_verified: false,
                trusted_domain: false,
                message: format!("Issuer URL '{issuer_url}' is not a valid absolute URL"),
            };
        };
        let host = url.host_str().unwrap_or(issuer_url);

        let trusted = self.registry.is_trusted(host);
        let outcome = self.probe.probe(issuer_url).await;
        let id_present = certificate_id.is_some_and(|id| !id.trim().is_empty());

        let parts = [
            if trusted {
                format!("issuer domain '{host}' is in the trusted registry")
            } else {
                format!("issuer domain '{host}' is not in the trusted registry")
            },
            outcome.detail.clone(),
            if id_present {
                "certificate id is present".to_string()
            } else {
                "no certificate id was found".to_string()
            },
        ];

        VerificationResult {
            is_verified: trusted && outcome.reachable && id_present,
            trusted_domain: trusted,
            message: parts.join("; "),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    use super::*;
    use crate::config::PipelineConfig;

    async fn serve_once() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n")
                    .await;
            }
        });
        format!("http://{addr}/verify/ABC123")
    }

    fn agent(registry: TrustedDomainRegistry) -> VerificationAgent {
        let mut config = PipelineConfig::default();
        config.probe_timeout = std::time::Duration::from_millis(500);
        config.probe_retries = 0;
        let probe = ReachabilityProbe::new(&config).unwrap();
        VerificationAgent::new(Arc::new(registry), probe)
    }

    fn extraction(certificate_id: Option<&str>, issuer_url: Option<&str>) -> ExtractionResult {
        ExtractionResult {
            certificate_id: certificate_id.map(String::from),
            issuer_url: issuer_url.map(String::from),
            ..ExtractionResult::empty()
        }
    }

    #[tokio::test]
    async fn test_all_three_checks_pass() {
        let url = serve_once().await;
        let agent = agent(TrustedDomainRegistry::with_domains(["127.0.0.1"]));
        let result = agent.verify(&extraction(Some("UC-123456"), Some(&url))).await;
        assert!(result.is_verified);
        assert!(result.trusted_domain);
        assert!(result.message.contains("trusted registry"));
    }

    #[tokio::test]
    async fn test_untrusted_domain_fails_even_when_reachable() {
        let url = serve_once().await;
        let agent = agent(TrustedDomainRegistry::builtin());
        let result = agent.verify(&extraction(Some("UC-123456"), Some(&url))).await;
        assert!(!result.is_verified);
        assert!(!result.trusted_domain);
        assert!(result.message.contains("not in the trusted registry"));
    }

    #[tokio::test]
    async fn test_missing_certificate_id_fails() {
        let url = serve_once().await;
        let agent = agent(TrustedDomainRegistry::with_domains(["127.0.0.1"]));
        let result = agent.verify(&extraction(None, Some(&url))).await;
        assert!(!result.is_verified);
        assert!(result.trusted_domain);
        assert!(result.message.contains("no certificate id"));
    }

    #[tokio::test]
    async fn test_no_issuer_url() {
        let agent = agent(TrustedDomainRegistry::builtin());
        let result = agent.verify(&extraction(Some("UC-123456"), None)).await;
        assert!(!result.is_verified);
        assert!(!result.trusted_domain);
        assert!(result.message.contains("No issuer URL"));
    }

    #[tokio::test]
    async fn test_manual_blank_request_is_validation_error() {
        let agent = agent(TrustedDomainRegistry::builtin());
        let request = ManualVerificationRequest {
            certificate_id: " ".into(),
            issuer_url: "https://www.udemy.com/certificate/UC-1".into(),
        };
        assert!(agent.verify_manual(&request).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_manual_malformed_url_named_in_message() {
        let agent = agent(TrustedDomainRegistry::builtin());
        let request = ManualVerificationRequest {
            certificate_id: "UC-123456".into(),
            issuer_url: "not a url at all".into(),
        };
        let result = agent.verify_manual(&request).await.unwrap();
        assert!(!result.is_verified);
        assert!(!result.trusted_domain);
        assert!(result.message.contains("not a valid absolute URL"));
        assert!(!result.message.contains("No issuer URL"));
    }

    #[tokio::test]
    async fn test_manual_schemeless_url_is_normalized() {
        let url = serve_once().await;
        let agent = agent(TrustedDomainRegistry::with_domains(["127.0.0.1"]));
        let request = ManualVerificationRequest {
            certificate_id: "UC-123456".into(),
            issuer_url: url.trim_start_matches("http://").to_string(),
        };
        // Normalization prepends https; the plain listener refuses TLS, so
        // the interesting assertion is that the URL parsed and was probed.
        let result = agent.verify_manual(&request).await.unwrap();
        assert!(result.trusted_domain);
    }
}
