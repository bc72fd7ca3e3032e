//! Forensic manipulation detection.
//!
//! The agent reduces a per-region anomaly map from the forensics model to one
//! scalar score, classifies it against two fixed cutoffs, and optionally
//! cross-checks the score against a reasoning judge. The stage is fail-safe:
//! a document that cannot be analyzed is flagged, never cleared.

use std::sync::Arc;

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use tracing::{debug, instrument, warn};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::types::{DocumentImage, ForensicsResult, ForensicsStatus};

/// One region of the document with an anomaly score.
#[derive(Debug, Clone)]
pub struct AnomalyRegion {
    /// Human-readable location, e.g. "top-right quadrant".
    pub location: String,
    /// Anomaly score in [0, 1].
    pub score: f64,
}

/// Per-region manipulation signal returned by a forensics model.
#[derive(Debug, Clone, Default)]
pub struct AnomalyMap {
    /// Scored regions, empty when the model found nothing to report.
    pub regions: Vec<AnomalyRegion>,
}

impl AnomalyMap {
    /// Reduce the map to a single scalar.
    ///
    /// Uses the maximum over regions so a small but significant tamper is not
    /// averaged away by a clean background.
    #[must_use]
    pub fn peak_score(&self) -> f64 {
        self.regions
            .iter()
            .map(|r| r.score)
            .fold(0.0, f64::max)
            .clamp(0.0, 1.0)
    }
}

/// A pluggable manipulation-assessment model.
#[async_trait]
pub trait ForensicsModel: Send + Sync {
    /// Stable model identifier used in logs.
    fn name(&self) -> &str;

    /// Assess the image and return a per-region anomaly map.
    ///
    /// # Errors
    ///
    /// Returns an error for corrupt or unsupported images; the agent folds
    /// this into a fail-safe high-risk result.
    async fn assess(&self, image: &[u8]) -> Result<AnomalyMap, PipelineError>;
}

/// Risk estimate from the optional reasoning judge.
#[derive(Debug, Clone)]
pub struct JudgeOpinion {
    /// Risk estimate in [0, 1].
    pub risk_score: f64,
    /// Self-reported confidence in [0, 1].
    pub confidence: f64,
    /// Narrative description of what the judge saw.
    pub analysis: String,
    /// Short rationale for the risk estimate.
    pub reasoning: String,
}

/// A pluggable reasoning-based second opinion on the same image.
#[async_trait]
pub trait ForensicsJudge: Send + Sync {
    /// Produce a corroborating risk estimate.
    ///
    /// # Errors
    ///
    /// Returns an error when the judge is unavailable; the agent falls back
    /// to model-score-only classification.
    async fn judge(&self, image: &[u8]) -> Result<JudgeOpinion, PipelineError>;
}

/// Classify a manipulation score against the configured cutoffs.
///
/// The returned flag holds exactly at and above the high-risk threshold.
#[must_use]
pub fn classify_score(score: f64, config: &PipelineConfig) -> (ForensicsStatus, bool) {
    if score >= config.high_risk_threshold {
        (ForensicsStatus::Manipulated, true)
    } else if score >= config.suspicious_threshold {
        (ForensicsStatus::Suspicious, false)
    } else {
        (ForensicsStatus::Authentic, false)
    }
}

/// The forensic manipulation detection stage.
pub struct ForensicsAgent {
    /// Primary manipulation model.
    model: Arc<dyn ForensicsModel>,
    /// Optional reasoning judge; absent means model-score-only.
    judge: Option<Arc<dyn ForensicsJudge>>,
    /// Shared pipeline configuration.
    config: PipelineConfig,
}

impl ForensicsAgent {
    /// Create an agent that classifies on the model score alone.
    #[must_use]
    pub fn new(model: Arc<dyn ForensicsModel>, config: PipelineConfig) -> Self {
        Self {
            model,
            judge: None,
            config,
        }
    }

    /// Add a reasoning judge as a second opinion.
    #[must_use]
    pub fn with_judge(mut self, judge: Arc<dyn ForensicsJudge>) -> Self {
        self.judge = Some(judge);
        self
    }

    /// Analyze a document image.
    ///
    /// Never returns an error for recoverable failures; model failure yields
    /// the fail-safe `AnalysisFailed` result instead.
    #[instrument(skip_all, fields(filename = %document.filename, model = self.model.name()))]
    pub async fn analyze(&self, document: &DocumentImage) -> ForensicsResult {
        let map = match self.model.assess(&document.bytes).await {
            Ok(map) => map,
            Err(e) => {
                warn!(error = %e, "Forensic model inference failed, flagging document");
                return ForensicsResult::analysis_failed(format!(
                    "Forensic model inference failed: {e}"
                ));
            },
        };

        let model_score = map.peak_score();
        let mut details: Vec<String> = map
            .regions
            .iter()
            .map(|r| format!("{}: anomaly score {:.2}", r.location, r.score))
            .collect();

        // Metadata traces are evidence for the reviewer, not a score input.
        for software in editing_software_traces(&document.bytes) {
            details.push(format!("Editing software detected in metadata: {software}"));
        }

        let mut effective_score = model_score;
        let mut judge_opinion = None;

        if let Some(judge) = &self.judge {
            match judge.judge(&document.bytes).await {
                Ok(opinion) => {
                    let judge_score = opinion.risk_score.clamp(0.0, 1.0);
                    let divergence = (judge_score - model_score).abs();
                    if divergence > self.config.judge_divergence_margin {
                        // Bias toward the more cautious estimate.
                        effective_score = model_score.max(judge_score);
                        details.push(format!(
                            "Judge risk {judge_score:.2} diverges from model score \
                             {model_score:.2} by {divergence:.2}; keeping the higher"
                        ));
                    }
                    details.push(format!("Judge rationale: {}", opinion.reasoning));
                    judge_opinion = Some(opinion);
                },
                Err(e) => {
                    warn!(error = %e, "Reasoning judge unavailable, using model score only");
                    details.push(format!("Reasoning judge unavailable: {e}"));
                },
            }
        }

        let effective_score = effective_score.clamp(0.0, 1.0);
        let (status, is_high_risk) = classify_score(effective_score, &self.config);

        debug!(
            model_score,
            effective_score,
            is_high_risk,
            status = ?status,
            "Forensic analysis complete"
        );

        let mut result = ForensicsResult::new(effective_score, is_high_risk, status, details);
        if let Some(opinion) = judge_opinion {
            result.attach_judge(
                opinion.analysis,
                opinion.risk_score,
                opinion.confidence,
                opinion.reasoning,
            );
        }
        result
    }
}

/// Image editor names looked for in EXIF Make/Software fields.
const EDITOR_MARKERS: &[&str] = &["photoshop", "gimp", "paint", "editor"];

/// Scan EXIF metadata for traces of image-editing software.
///
/// Returns the offending Make/Software strings. Absent or unreadable EXIF
/// yields an empty list; most legitimate exports strip metadata, so only a
/// positive hit is evidence.
fn editing_software_traces(data: &[u8]) -> Vec<String> {
    let mut cursor = std::io::Cursor::new(data);
    let Ok(exif) = exif::Reader::new().read_from_container(&mut cursor) else {
        return Vec::new();
    };

    let mut traces = Vec::new();
    for tag in [exif::Tag::Make, exif::Tag::Software] {
        let Some(field) = exif.get_field(tag, exif::In::PRIMARY) else {
            continue;
        };
        if let exif::Value::Ascii(ref values) = field.value {
            for raw in values {
                let text = String::from_utf8_lossy(raw).trim().to_string();
                let lower = text.to_lowercase();
                if EDITOR_MARKERS.iter().any(|marker| lower.contains(marker)) {
                    traces.push(text);
                }
            }
        }
    }
    traces
}

/// Built-in error-level-analysis model.
///
/// Recompresses the image as JPEG and measures where the pixel difference
/// deviates from the frame average. Spliced or re-saved regions compress
/// differently from the rest of the frame, which shows up as a high
/// suspicious-pixel ratio.
pub struct ElaModel {
    /// JPEG recompression quality.
    quality: u8,
}

impl ElaModel {
    /// Create a model with the configured recompression quality.
    #[must_use]
    pub fn new(quality: u8) -> Self {
        Self { quality }
    }
}

impl Default for ElaModel {
    fn default() -> Self {
        Self::new(PipelineConfig::default().ela_quality)
    }
}

#[async_trait]
impl ForensicsModel for ElaModel {
    fn name(&self) -> &str {
        "error-level-analysis"
    }

    async fn assess(&self, image: &[u8]) -> Result<AnomalyMap, PipelineError> {
        let data = image.to_vec();
        let quality = self.quality;

        // Pure pixel math, kept off the async worker threads.
        tokio::task::spawn_blocking(move || ela_assess(&data, quality))
            .await
            .map_err(|e| PipelineError::StageDegraded {
                stage: "forensics",
                message: format!("analysis task failed: {e}"),
            })?
    }
}

/// Run error-level analysis over the full frame.
fn ela_assess(data: &[u8], quality: u8) -> Result<AnomalyMap, PipelineError> {
    let original = image::load_from_memory(data)
        .map_err(|e| PipelineError::Image {
            message: format!("cannot decode image: {e}"),
        })?
        .to_rgb8();

    let mut recompressed_bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut recompressed_bytes, quality)
        .encode_image(&original)
        .map_err(|e| PipelineError::Image {
            message: format!("recompression failed: {e}"),
        })?;

    let recompressed = image::load_from_memory(&recompressed_bytes)
        .map_err(|e| PipelineError::Image {
            message: format!("cannot decode recompressed image: {e}"),
        })?
        .to_rgb8();

    let a = original.as_raw();
    let b = recompressed.as_raw();
    let len = a.len().min(b.len());
    if len == 0 {
        return Err(PipelineError::Image {
            message: "image has no pixel data".into(),
        });
    }

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    for i in 0..len {
        let diff = f64::from(a[i].abs_diff(b[i]));
        sum += diff;
        sum_sq += diff * diff;
    }
    let n = len as f64;
    let mean = sum / n;
    let variance = (sum_sq / n - mean * mean).max(0.0);
    let std_dev = variance.sqrt();

    let cutoff = mean + 2.0 * std_dev;
    let suspicious = (0..len)
        .filter(|&i| f64::from(a[i].abs_diff(b[i])) > cutoff)
        .count();
    let suspicious_ratio = suspicious as f64 / n;
    let score = (suspicious_ratio * 10.0).min(1.0);

    Ok(AnomalyMap {
        regions: vec![AnomalyRegion {
            location: format!(
                "full frame error-level analysis (suspicious pixel ratio {suspicious_ratio:.4}, \
                 mean diff {mean:.2})"
            ),
            score,
        }],
    })
}
