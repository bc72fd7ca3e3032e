//! # certverify
//!
//! Credential-document authenticity pipeline: forensic manipulation
//! detection, multi-engine OCR field extraction, and issuer verification,
//! combined into a single enumerated verdict.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     AnalysisEngine                          │
//! │                                                             │
//! │  ┌────────────────────┐     ┌────────────────────┐          │
//! │  │   ForensicsAgent   │     │  ExtractionAgent   │          │
//! │  │  (model + judge)   │     │  (N OCR engines,   │          │
//! │  │                    │     │   quorum vote)     │          │
//! │  └────────────────────┘     └─────────┬──────────┘          │
//! │        concurrent                     │                     │
//! │                                       ▼                     │
//! │                          ┌────────────────────────┐         │
//! │                          │   VerificationAgent    │         │
//! │                          │ (trusted registry +    │         │
//! │                          │  reachability probe)   │         │
//! │                          └───────────┬────────────┘         │
//! │                                      │                      │
//! │                                      ▼                      │
//! │                          ┌────────────────────────┐         │
//! │                          │     decide_verdict     │         │
//! │                          │  (forensic veto first) │         │
//! │                          └────────────────────────┘         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Pipeline Properties
//!
//! - **Fail-safe forensics**: an unanalyzable document is flagged, never waved through
//! - **No minority guesses**: extracted fields need an engine quorum or stay null
//! - **Conjunctive verification**: trusted domain AND reachable URL AND certificate id
//! - **Forensic veto**: a high-risk finding overrides a successful verification

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::pedantic)] // Too strict for production code
#![allow(clippy::doc_markdown)] // Allow product names without backticks
#![allow(clippy::missing_errors_doc)] // Error documentation not required
#![allow(clippy::missing_panics_doc)] // Panic documentation not required
#![allow(clippy::module_name_repetitions)] // Allow Type in module::Type
#![allow(clippy::must_use_candidate)] // Not all functions need must_use

pub mod config;
pub mod engine;
pub mod error;
pub mod extraction;
pub mod forensics;
pub mod ocr;
pub mod probe;
pub mod registry;
pub mod types;
pub mod verification;

pub use config::PipelineConfig;
pub use engine::{decide_verdict, AnalysisEngine};
pub use error::PipelineError;
pub use extraction::{reconcile_field, ExtractionAgent, FieldVote};
pub use forensics::{
    classify_score, AnomalyMap, AnomalyRegion, ElaModel, ForensicsAgent, ForensicsJudge,
    ForensicsModel, JudgeOpinion,
};
pub use ocr::{OcrEngine, OcrOutput};
pub use probe::{ProbeOutcome, ReachabilityProbe};
pub use registry::TrustedDomainRegistry;
pub use types::{
    CertificateAnalysisResponse, DocumentImage, ExtractionResult, FinalVerdict, ForensicsResult,
    ForensicsStatus, ManualVerificationRequest, VerificationResult,
};
pub use verification::VerificationAgent;
