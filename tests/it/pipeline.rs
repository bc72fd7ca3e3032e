//! End-to-end pipeline scenarios over mock stage backends.
//!
//! The forensic model and OCR engines are scripted; the issuer probe hits
//! a real listener on a random local port, so the verification path is
//! exercised over actual HTTP.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

use certverify::{
    AnalysisEngine, AnomalyMap, AnomalyRegion, DocumentImage, ExtractionAgent, FinalVerdict,
    ForensicsAgent, ForensicsModel, ForensicsStatus, ManualVerificationRequest, OcrEngine,
    OcrOutput, PipelineConfig, PipelineError, ReachabilityProbe, TrustedDomainRegistry,
    VerificationAgent,
};

// =============================================================================
// Scripted stage backends
// =============================================================================

struct ScriptedModel {
    score: f64,
}

#[async_trait]
impl ForensicsModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn assess(&self, _image: &[u8]) -> Result<AnomalyMap, PipelineError> {
        Ok(AnomalyMap {
            regions: vec![AnomalyRegion {
                location: "full frame".to_string(),
                score: self.score,
            }],
        })
    }
}

struct ScriptedEngine {
    name: String,
    text: String,
}

#[async_trait]
impl OcrEngine for ScriptedEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn recognize(&self, _image: &[u8]) -> Result<OcrOutput, PipelineError> {
        Ok(OcrOutput {
            text: self.text.clone(),
            confidence: 0.85,
        })
    }
}

struct BrokenEngine;

#[async_trait]
impl OcrEngine for BrokenEngine {
    fn name(&self) -> &str {
        "broken"
    }

    async fn recognize(&self, _image: &[u8]) -> Result<OcrOutput, PipelineError> {
        Err(PipelineError::StageDegraded {
            stage: "extraction",
            message: "engine unavailable".into(),
        })
    }
}

// =============================================================================
// Fixture assembly
// =============================================================================

/// One-shot HTTP server on a random local port; returns the issuer URL.
async fn serve_issuer() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        // Serve a handful of requests; retries and redirects stay local.
        for _ in 0..4 {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n")
                .await;
        }
    });
    format!("http://{addr}/verify/UC-123456789012")
}

fn fast_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.probe_timeout = Duration::from_millis(500);
    config.probe_retries = 0;
    config.ocr_timeout = Duration::from_secs(2);
    config
}

fn document_text(issuer_url: &str) -> String {
    format!(
        "Certificate of Completion\n\
         This is to certify that Roopak Krishna\n\
         Certificate: UC-123456789012\n\
         issued by Udemy on March 12, 2024\n\
         Verify at {issuer_url}"
    )
}

fn engine_with(
    model_score: f64,
    ocr_engines: Vec<Arc<dyn OcrEngine>>,
    registry: TrustedDomainRegistry,
) -> AnalysisEngine {
    let config = fast_config();
    let forensics = ForensicsAgent::new(
        Arc::new(ScriptedModel { score: model_score }),
        config.clone(),
    );
    let extraction = ExtractionAgent::new(ocr_engines, config.clone());
    let probe = ReachabilityProbe::new(&config).unwrap();
    let verification = VerificationAgent::new(Arc::new(registry), probe);
    AnalysisEngine::new(forensics, extraction, verification)
}

fn two_agreeing_engines(text: &str) -> Vec<Arc<dyn OcrEngine>> {
    vec![
        Arc::new(ScriptedEngine {
            name: "tesseract".into(),
            text: text.to_string(),
        }),
        Arc::new(ScriptedEngine {
            name: "easyocr".into(),
            text: text.to_string(),
        }),
    ]
}

fn upload() -> DocumentImage {
    DocumentImage {
        bytes: vec![1u8; 16],
        mime_type: "image/png".into(),
        filename: "certificate.png".into(),
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn authentic_trusted_reachable_is_verified() {
    let issuer_url = serve_issuer().await;
    let engine = engine_with(
        0.05,
        two_agreeing_engines(&document_text(&issuer_url)),
        TrustedDomainRegistry::with_domains(["127.0.0.1"]),
    );

    let response = engine.analyze(&upload()).await.unwrap();

    assert_eq!(response.final_verdict, FinalVerdict::Verified);
    assert_eq!(response.forensics.status, ForensicsStatus::Authentic);
    assert!(response.verification.is_verified);
    assert_eq!(
        response.extraction.certificate_id.as_deref(),
        Some("UC-123456789012")
    );
    assert_eq!(response.filename, "certificate.png");
}

#[tokio::test]
async fn high_risk_forensics_vetoes_successful_verification() {
    let issuer_url = serve_issuer().await;
    let engine = engine_with(
        0.85,
        two_agreeing_engines(&document_text(&issuer_url)),
        TrustedDomainRegistry::with_domains(["127.0.0.1"]),
    );

    let response = engine.analyze(&upload()).await.unwrap();

    // Verification itself succeeded; the verdict still flags.
    assert!(response.verification.is_verified);
    assert_eq!(response.final_verdict, FinalVerdict::FlaggedHighRisk);
    assert_eq!(response.forensics.status, ForensicsStatus::Manipulated);
    assert!(response.forensics.is_high_risk);
}

#[tokio::test]
async fn untrusted_issuer_with_identifier_is_unverified() {
    let issuer_url = serve_issuer().await;
    // The local listener's address is not in the built-in registry.
    let engine = engine_with(
        0.05,
        two_agreeing_engines(&document_text(&issuer_url)),
        TrustedDomainRegistry::builtin(),
    );

    let response = engine.analyze(&upload()).await.unwrap();

    assert_eq!(response.final_verdict, FinalVerdict::Unverified);
    assert!(!response.verification.is_verified);
    assert!(!response.verification.trusted_domain);
    assert!(response.extraction.has_identifier());
}

#[tokio::test]
async fn no_data_at_all_is_flagged_for_manual_review() {
    let engine = engine_with(
        0.05,
        vec![Arc::new(BrokenEngine)],
        TrustedDomainRegistry::builtin(),
    );

    let response = engine.analyze(&upload()).await.unwrap();

    assert_eq!(response.final_verdict, FinalVerdict::FlaggedManualReview);
    assert!(!response.extraction.has_identifier());
    assert!(response.extraction.raw_text_snippet.is_none());
    assert!(response.verification.message.contains("No issuer URL"));
}

#[tokio::test]
async fn unreadable_image_fails_safe_to_high_risk() {
    struct CorruptModel;

    #[async_trait]
    impl ForensicsModel for CorruptModel {
        fn name(&self) -> &str {
            "corrupt"
        }

        async fn assess(&self, _image: &[u8]) -> Result<AnomalyMap, PipelineError> {
            Err(PipelineError::Image {
                message: "cannot decode image".into(),
            })
        }
    }

    let config = fast_config();
    let forensics = ForensicsAgent::new(Arc::new(CorruptModel), config.clone());
    let extraction = ExtractionAgent::new(vec![Arc::new(BrokenEngine)], config.clone());
    let probe = ReachabilityProbe::new(&config).unwrap();
    let verification = VerificationAgent::new(Arc::new(TrustedDomainRegistry::builtin()), probe);
    let engine = AnalysisEngine::new(forensics, extraction, verification);

    let response = engine.analyze(&upload()).await.unwrap();

    assert_eq!(response.final_verdict, FinalVerdict::FlaggedHighRisk);
    assert_eq!(response.forensics.status, ForensicsStatus::AnalysisFailed);
    assert_eq!(response.forensics.manipulation_score, 1.0);
}

#[tokio::test]
async fn empty_upload_is_rejected_before_any_stage_runs() {
    let engine = engine_with(0.05, Vec::new(), TrustedDomainRegistry::builtin());
    let document = DocumentImage {
        bytes: Vec::new(),
        mime_type: "image/png".into(),
        filename: "empty.png".into(),
    };

    let err = engine.analyze(&document).await.unwrap_err();
    assert!(err.is_validation());
}

#[tokio::test]
async fn manual_verification_against_trusted_reachable_issuer() {
    let issuer_url = serve_issuer().await;
    let engine = engine_with(
        0.05,
        Vec::new(),
        TrustedDomainRegistry::with_domains(["127.0.0.1"]),
    );

    let request = ManualVerificationRequest {
        certificate_id: "UC-123456789012".into(),
        issuer_url,
    };
    let response = engine.verify_manual(&request).await.unwrap();

    assert_eq!(response.final_verdict, FinalVerdict::Verified);
    assert_eq!(response.filename, "manual-entry");
    // No document was analyzed; forensics is a neutral placeholder.
    assert!(!response.forensics.is_high_risk);
    assert_eq!(response.forensics.manipulation_score, 0.0);
    assert!(response.extraction.certificate_id.is_none());
}

#[tokio::test]
async fn manual_verification_of_untrusted_issuer_is_unverified() {
    let issuer_url = serve_issuer().await;
    let engine = engine_with(0.05, Vec::new(), TrustedDomainRegistry::builtin());

    let request = ManualVerificationRequest {
        certificate_id: "UC-123456789012".into(),
        issuer_url,
    };
    let response = engine.verify_manual(&request).await.unwrap();

    assert_eq!(response.final_verdict, FinalVerdict::Unverified);
    assert!(!response.verification.trusted_domain);
}

#[tokio::test]
async fn response_serializes_with_wire_verdict_names() {
    let issuer_url = serve_issuer().await;
    let engine = engine_with(
        0.85,
        two_agreeing_engines(&document_text(&issuer_url)),
        TrustedDomainRegistry::with_domains(["127.0.0.1"]),
    );

    let response = engine.analyze(&upload()).await.unwrap();
    let json = serde_json::to_value(&response).unwrap();

    assert_eq!(json["final_verdict"], "FLAGGED_HIGH_RISK");
    assert_eq!(json["forensics"]["status"], "MANIPULATED");
    // Judge fields are absent from this run but still serialized as null.
    assert!(json["forensics"]["llm_analysis"].is_null());
    assert!(json["verification"]["is_verified"].is_boolean());
}
