//! OCR engine capability interface.
//!
//! Each engine is a pluggable implementation of one `recognize` capability;
//! the extraction agent fans out to every configured engine and reconciles
//! their outputs. Engine internals (Tesseract, cloud OCR, vision models) live
//! behind this trait in collaborator crates.

use async_trait::async_trait;

use crate::error::PipelineError;

/// Raw output of a single OCR engine run.
#[derive(Debug, Clone)]
pub struct OcrOutput {
    /// Full recognized text.
    pub text: String,
    /// Engine-reported average confidence in [0, 1].
    pub confidence: f64,
}

/// A pluggable text-recognition engine.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Stable engine identifier used in logs and vote accounting.
    fn name(&self) -> &str;

    /// Recognize text in the given image bytes.
    ///
    /// # Errors
    ///
    /// Returns an error when the engine cannot process the image; the
    /// extraction agent treats this as that engine abstaining from the vote.
    async fn recognize(&self, image: &[u8]) -> Result<OcrOutput, PipelineError>;
}
