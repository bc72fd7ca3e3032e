//! Data model for pipeline requests and responses.
//!
//! The response contract is "always fully shaped": optional fields serialize
//! as explicit `null`, never as missing keys, so none of the `Option` fields
//! below carry `skip_serializing_if`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// A normalized document image handed in by the preprocessing collaborator.
///
/// Owned by the request; the pipeline never persists it.
#[derive(Debug, Clone)]
pub struct DocumentImage {
    /// Raw image bytes (already converted from PDF where applicable).
    pub bytes: Vec<u8>,
    /// Declared mime type, e.g. `image/png`.
    pub mime_type: String,
    /// Original upload filename, echoed in the response.
    pub filename: String,
}

/// Classification of the forensic analysis outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ForensicsStatus {
    /// No manipulation evidence above the suspicious cutoff.
    Authentic,
    /// Some irregularities detected, below the high-risk cutoff.
    Suspicious,
    /// Manipulation evidence at or above the high-risk cutoff.
    Manipulated,
    /// Model inference failed; treated as high risk by default.
    AnalysisFailed,
}

/// Result of the forensic manipulation stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForensicsResult {
    /// Scalar tamper evidence in [0, 1].
    pub manipulation_score: f64,
    /// True exactly when the score reaches the high-risk threshold.
    pub is_high_risk: bool,
    /// Classified outcome.
    pub status: ForensicsStatus,
    /// Human-readable evidence strings, in the order they were produced.
    pub details: Vec<String>,
    /// Judge narrative (present only when the reasoning judge ran).
    pub llm_analysis: Option<String>,
    /// Judge risk estimate in [0, 1].
    pub llm_risk_score: Option<f64>,
    /// Judge self-reported confidence in [0, 1].
    pub llm_confidence: Option<f64>,
    /// Judge rationale summary.
    pub llm_reasoning: Option<String>,
}

impl ForensicsResult {
    /// Build a result without judge fields.
    #[must_use]
    pub fn new(
        manipulation_score: f64,
        is_high_risk: bool,
        status: ForensicsStatus,
        details: Vec<String>,
    ) -> Self {
        Self {
            manipulation_score,
            is_high_risk,
            status,
            details,
            llm_analysis: None,
            llm_risk_score: None,
            llm_confidence: None,
            llm_reasoning: None,
        }
    }

    /// Fail-safe default when model inference cannot run.
    ///
    /// Forensics errs toward flagging, so an unanalyzable document scores 1.0
    /// and is high risk.
    #[must_use]
    pub fn analysis_failed(detail: String) -> Self {
        Self::new(
            1.0,
            true,
            ForensicsStatus::AnalysisFailed,
            vec![detail],
        )
    }

    /// Neutral placeholder for responses where no document was analyzed
    /// (manual verification path).
    #[must_use]
    pub fn not_analyzed() -> Self {
        Self::new(
            0.0,
            false,
            ForensicsStatus::Authentic,
            vec!["Forensic analysis was not performed (manual verification)".to_string()],
        )
    }

    /// Attach the judge fields. They are all-or-nothing by construction,
    /// and the numeric estimates are clamped to [0, 1] on the way in.
    pub fn attach_judge(
        &mut self,
        analysis: String,
        risk_score: f64,
        confidence: f64,
        reasoning: String,
    ) {
        self.llm_analysis = Some(analysis);
        self.llm_risk_score = Some(risk_score.clamp(0.0, 1.0));
        self.llm_confidence = Some(confidence.clamp(0.0, 1.0));
        self.llm_reasoning = Some(reasoning);
    }
}

/// Structured fields reconciled from the OCR engines.
///
/// Every field is independently nullable; absence is a normal outcome, not an
/// error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Name of the person the credential was issued to.
    pub candidate_name: Option<String>,
    /// Unique certificate identifier.
    pub certificate_id: Option<String>,
    /// Recognized issuing platform name.
    pub issuer_name: Option<String>,
    /// Absolute verification URL found on the document.
    pub issuer_url: Option<String>,
    /// Organization named as the issuer, when distinct from the platform.
    pub issuer_org: Option<String>,
    /// Truncated raw OCR text, kept as a diagnostic for manual review.
    pub raw_text_snippet: Option<String>,
    /// Issue or completion date as printed.
    pub certificate_date: Option<String>,
}

impl ExtractionResult {
    /// Fully-null result, the valid outcome when every engine fails.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// True when the document yielded enough identifying data to offer the
    /// manual-verification path.
    #[must_use]
    pub fn has_identifier(&self) -> bool {
        self.certificate_id.is_some() || self.issuer_url.is_some()
    }
}

/// Result of the issuer verification stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    /// True only when the domain is trusted, the URL responded, and a
    /// certificate id is present.
    pub is_verified: bool,
    /// Whether the issuer domain is in the trusted registry.
    pub trusted_domain: bool,
    /// Plain-language summary of which checks passed or failed.
    pub message: String,
}

/// The single enumerated outcome of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalVerdict {
    /// Issuer verification succeeded and no forensic veto applied.
    Verified,
    /// Identifying data exists but verification did not succeed.
    Unverified,
    /// Forensics vetoed the document regardless of other stages.
    FlaggedHighRisk,
    /// Not enough data even to pre-fill manual verification.
    FlaggedManualReview,
}

/// Aggregate response assembled by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateAnalysisResponse {
    /// Original upload filename.
    pub filename: String,
    /// When the analysis finished.
    pub analyzed_at: DateTime<Utc>,
    /// Outcome of the verdict decision rule.
    pub final_verdict: FinalVerdict,
    /// Forensic stage output.
    pub forensics: ForensicsResult,
    /// Extraction stage output.
    pub extraction: ExtractionResult,
    /// Verification stage output.
    pub verification: VerificationResult,
}

/// Caller-supplied identifiers for the manual-verification path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualVerificationRequest {
    /// Certificate identifier as printed on the document.
    pub certificate_id: String,
    /// Issuer verification URL.
    pub issuer_url: String,
}

impl ManualVerificationRequest {
    /// Reject blank fields before any agent runs.
    ///
    /// # Errors
    ///
    /// Returns a validation error if either field is empty or whitespace.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.certificate_id.trim().is_empty() {
            return Err(PipelineError::Validation {
                message: "certificate_id must not be blank".into(),
            });
        }
        if self.issuer_url.trim().is_empty() {
            return Err(PipelineError::Validation {
                message: "issuer_url must not be blank".into(),
            });
        }
        Ok(())
    }
}
