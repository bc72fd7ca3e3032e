//! Pipeline orchestrator and verdict decision rule.
//!
//! The engine owns the three stage agents and runs them as a fixed
//! pipeline: forensics and extraction concurrently, then verification over
//! the extraction output, then the verdict. Stage degradation never aborts
//! a run; each agent folds its own failures into a degraded result and the
//! verdict rule decides from whatever survived.

use chrono::Utc;
use tracing::{info, instrument};

use crate::error::PipelineError;
use crate::extraction::ExtractionAgent;
use crate::forensics::ForensicsAgent;
use crate::types::{
    CertificateAnalysisResponse, DocumentImage, ExtractionResult, FinalVerdict, ForensicsResult,
    ManualVerificationRequest,
};
use crate::verification::VerificationAgent;

/// Filename echoed for responses that did not come from an upload.
const MANUAL_ENTRY_FILENAME: &str = "manual-entry";

/// The full analysis pipeline.
pub struct AnalysisEngine {
    forensics: ForensicsAgent,
    extraction: ExtractionAgent,
    verification: VerificationAgent,
}

impl AnalysisEngine {
    /// Assemble the pipeline from its stage agents.
    #[must_use]
    pub fn new(
        forensics: ForensicsAgent,
        extraction: ExtractionAgent,
        verification: VerificationAgent,
    ) -> Self {
        Self {
            forensics,
            extraction,
            verification,
        }
    }

    /// Run the full pipeline over one document.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty upload. Stage failures do
    /// not surface as errors; they degrade the corresponding result.
    #[instrument(skip_all, fields(filename = %document.filename, bytes = document.bytes.len()))]
    pub async fn analyze(
        &self,
        document: &DocumentImage,
    ) -> Result<CertificateAnalysisResponse, PipelineError> {
        if document.bytes.is_empty() {
            return Err(PipelineError::Validation {
                message: "uploaded document is empty".into(),
            });
        }

        // Forensics and extraction are independent; verification needs the
        // extracted issuer data and runs after.
        let (forensics, extraction) = tokio::join!(
            self.forensics.analyze(document),
            self.extraction.extract(document),
        );
        let verification = self.verification.verify(&extraction).await;

        let final_verdict = decide_verdict(
            forensics.is_high_risk,
            verification.is_verified,
            extraction.has_identifier(),
        );
        info!(
            filename = %document.filename,
            verdict = ?final_verdict,
            manipulation_score = forensics.manipulation_score,
            is_verified = verification.is_verified,
            "Analysis complete"
        );

        Ok(CertificateAnalysisResponse {
            filename: document.filename.clone(),
            analyzed_at: Utc::now(),
            final_verdict,
            forensics,
            extraction,
            verification,
        })
    }

    /// Verify caller-supplied identifiers without a document.
    ///
    /// No image means no forensics and no extraction; the response carries
    /// neutral placeholders for both, and the verdict can only be
    /// `Verified` or `Unverified`.
    ///
    /// # Errors
    ///
    /// Returns a validation error when either request field is blank.
    #[instrument(skip_all)]
    pub async fn verify_manual(
        &self,
        request: &ManualVerificationRequest,
    ) -> Result<CertificateAnalysisResponse, PipelineError> {
        let verification = self.verification.verify_manual(request).await?;

        let final_verdict = if verification.is_verified {
            FinalVerdict::Verified
        } else {
            FinalVerdict::Unverified
        };
        info!(verdict = ?final_verdict, "Manual verification complete");

        Ok(CertificateAnalysisResponse {
            filename: MANUAL_ENTRY_FILENAME.to_string(),
            analyzed_at: Utc::now(),
            final_verdict,
            forensics: ForensicsResult::not_analyzed(),
            extraction: ExtractionResult::empty(),
            verification,
        })
    }
}

/// The verdict decision rule, in veto order.
///
/// A high-risk forensic finding overrides everything else. Otherwise a
/// successful issuer verification wins; otherwise any identifying data
/// keeps the document in the unverified-but-actionable bucket; with
/// nothing at all, only manual review remains.
#[must_use]
pub fn decide_verdict(is_high_risk: bool, is_verified: bool, has_identifier: bool) -> FinalVerdict {
    if is_high_risk {
        FinalVerdict::FlaggedHighRisk
    } else if is_verified {
        FinalVerdict::Verified
    } else if has_identifier {
        FinalVerdict::Unverified
    } else {
        FinalVerdict::FlaggedManualReview
    }
}
