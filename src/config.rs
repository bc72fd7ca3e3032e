//! Configuration for the analysis pipeline.
//!
//! All cutoffs and budgets live here as named fields rather than scattered
//! literals. The numeric defaults mirror observed behavior of deployed
//! verifiers and are pending confirmation against issuer guidance; tune them
//! per deployment rather than editing call sites.

use std::time::Duration;

/// Configuration shared by all pipeline agents.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Manipulation score at or above which a document is classified
    /// Suspicious rather than Authentic.
    pub suspicious_threshold: f64,
    /// Manipulation score at or above which a document is classified
    /// Manipulated and flagged high risk.
    pub high_risk_threshold: f64,
    /// When the reasoning judge's risk estimate differs from the model score
    /// by more than this margin, the higher of the two wins.
    pub judge_divergence_margin: f64,
    /// JPEG recompression quality for the built-in error-level model.
    pub ela_quality: u8,
    /// Minimum number of OCR engines that must agree on a normalized value
    /// before a field is accepted.
    pub ocr_quorum: usize,
    /// Per-engine OCR budget. A slow engine is dropped, not waited on.
    pub ocr_timeout: Duration,
    /// Maximum length of the diagnostic raw text snippet.
    pub snippet_max_len: usize,
    /// Total budget for one issuer reachability probe attempt.
    pub probe_timeout: Duration,
    /// Retries after a transient probe failure.
    pub probe_retries: u32,
    /// Base backoff between probe attempts (a little jitter is added).
    pub probe_backoff: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            suspicious_threshold: 0.30,
            high_risk_threshold: 0.60,
            judge_divergence_margin: 0.25,
            ela_quality: 90,
            ocr_quorum: 2,
            ocr_timeout: Duration::from_secs(60),
            snippet_max_len: 300,
            probe_timeout: Duration::from_secs(5),
            probe_retries: 1,
            probe_backoff: Duration::from_millis(500),
        }
    }
}
