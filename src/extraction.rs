//! Structured-field extraction via multi-engine OCR reconciliation.
//!
//! Every configured engine reads the same image concurrently; per-field
//! pattern matchers then run against each engine's text independently, and a
//! quorum vote over the normalized candidates decides what goes into the
//! result. A decoded QR code on the document joins the vote as one more
//! candidate source. The stage never guesses from a minority, low-confidence
//! source: no quorum and no single unambiguous match means the field stays
//! null.

use std::sync::{Arc, OnceLock};

use futures::future::join_all;
use regex::Regex;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::PipelineConfig;
use crate::ocr::OcrEngine;
use crate::types::{DocumentImage, ExtractionResult};

/// One engine's completed read of the document.
#[derive(Debug, Clone)]
pub struct EngineRun {
    /// Engine identifier.
    pub engine: String,
    /// Full recognized text.
    pub text: String,
    /// Engine-reported average confidence for this run.
    pub confidence: f64,
}

/// A candidate value one engine produced for one field.
#[derive(Debug, Clone)]
pub struct FieldVote {
    /// Engine that produced the value.
    pub engine: String,
    /// Normalized candidate value.
    pub value: String,
    /// Confidence of the producing run.
    pub confidence: f64,
}

/// The structured-field extraction stage.
pub struct ExtractionAgent {
    /// Configured OCR engines, all invoked per request.
    engines: Vec<Arc<dyn OcrEngine>>,
    /// Shared pipeline configuration.
    config: PipelineConfig,
}

impl ExtractionAgent {
    /// Create an agent over the given engines.
    #[must_use]
    pub fn new(engines: Vec<Arc<dyn OcrEngine>>, config: PipelineConfig) -> Self {
        Self { engines, config }
    }

    /// Extract structured fields from a document image.
    ///
    /// Never returns an error for recoverable failures; if every engine
    /// fails the result is fully null, which signals "insufficient data"
    /// rather than aborting the pipeline.
    #[instrument(skip_all, fields(filename = %document.filename, engines = self.engines.len()))]
    pub async fn extract(&self, document: &DocumentImage) -> ExtractionResult {
        let qr_task = {
            let bytes = document.bytes.clone();
            tokio::task::spawn_blocking(move || decode_qr_payload(&bytes))
        };

        let runs = self.run_engines(document).await;
        let qr_payload = match qr_task.await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "QR detection task failed");
                None
            },
        };
        if let Some(payload) = &qr_payload {
            debug!(payload = %payload, "QR code decoded");
        }

        if runs.is_empty() && qr_payload.is_none() {
            warn!("All OCR engines failed or timed out and no QR code found; returning null extraction");
            return ExtractionResult::empty();
        }
        let result = reconcile_runs(&runs, qr_payload.as_deref(), &self.config);
        debug!(
            engines_succeeded = runs.len(),
            certificate_id = ?result.certificate_id,
            issuer_url = ?result.issuer_url,
            "Extraction reconciled"
        );
        result
    }

    /// Fan out to all engines concurrently, each under its own budget.
    async fn run_engines(&self, document: &DocumentImage) -> Vec<EngineRun> {
        let futures = self.engines.iter().map(|engine| {
            let engine = Arc::clone(engine);
            let budget = self.config.ocr_timeout;
            let bytes = &document.bytes;
            async move {
                match tokio::time::timeout(budget, engine.recognize(bytes)).await {
                    Ok(Ok(output)) => {
                        debug!(
                            engine = engine.name(),
                            chars = output.text.len(),
                            confidence = output.confidence,
                            "OCR engine finished"
                        );
                        Some(EngineRun {
                            engine: engine.name().to_string(),
                            text: output.text,
                            confidence: output.confidence.clamp(0.0, 1.0),
                        })
                    },
                    Ok(Err(e)) => {
                        warn!(engine = engine.name(), error = %e, "OCR engine failed");
                        None
                    },
                    Err(_) => {
                        warn!(engine = engine.name(), budget = ?budget, "OCR engine timed out");
                        None
                    },
                }
            }
        });

        join_all(futures).await.into_iter().flatten().collect()
    }
}

/// Reconcile the engine runs and an optional QR payload into a structured
/// result.
///
/// The QR payload votes like one more engine at full confidence (a decoded
/// code is exact, not probabilistic) but never contributes to the snippet.
/// Pure over its inputs so the vote can be tested without engines.
#[must_use]
pub fn reconcile_runs(
    runs: &[EngineRun],
    qr_payload: Option<&str>,
    config: &PipelineConfig,
) -> ExtractionResult {
    let vote = |matcher: fn(&str) -> Option<String>| -> Option<String> {
        let mut votes: Vec<FieldVote> = runs
            .iter()
            .filter_map(|run| {
                matcher(&run.text).map(|value| FieldVote {
                    engine: run.engine.clone(),
                    value,
                    confidence: run.confidence,
                })
            })
            .collect();
        if let Some(payload) = qr_payload {
            if let Some(value) = matcher(payload) {
                votes.push(FieldVote {
                    engine: "qr".to_string(),
                    value,
                    confidence: 1.0,
                });
            }
        }
        reconcile_field(&votes, config.ocr_quorum)
    };

    ExtractionResult {
        candidate_name: vote(match_candidate_name),
        certificate_id: vote(match_certificate_id),
        issuer_name: vote(match_issuer_name),
        issuer_url: vote(match_issuer_url),
        issuer_org: vote(match_issuer_org),
        certificate_date: vote(match_certificate_date),
        raw_text_snippet: best_snippet(runs, config.snippet_max_len),
    }
}

/// Quorum vote over one field's candidates.
///
/// A value wins when at least `quorum` engines agree on it after
/// normalization. With no quorum, the value is kept only when exactly one
/// engine produced any match at all; disagreement between several engines
/// with no majority yields `None`.
#[must_use]
pub fn reconcile_field(votes: &[FieldVote], quorum: usize) -> Option<String> {
    if votes.is_empty() {
        return None;
    }

    // Group identical normalized values, tracking support and total confidence.
    let mut groups: Vec<(String, usize, f64)> = Vec::new();
    for vote in votes {
        match groups.iter_mut().find(|g| g.0 == vote.value) {
            Some(group) => {
                group.1 += 1;
                group.2 += vote.confidence;
            },
            None => groups.push((vote.value.clone(), 1, vote.confidence)),
        }
    }

    let best = groups.iter().max_by(|a, b| {
        (a.1, a.2)
            .partial_cmp(&(b.1, b.2))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    if let Some((value, support, _)) = best {
        if *support >= quorum {
            return Some(value.clone());
        }
    }

    let mut engines: Vec<&str> = votes.iter().map(|v| v.engine.as_str()).collect();
    engines.sort_unstable();
    engines.dedup();
    if engines.len() == 1 {
        // A single engine matched; fall back to its best candidate.
        return votes
            .iter()
            .max_by(|a, b| {
                a.confidence
                    .partial_cmp(&b.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|v| v.value.clone());
    }

    None
}

/// Diagnostic snippet from the highest-confidence run.
fn best_snippet(runs: &[EngineRun], max_len: usize) -> Option<String> {
    let best = runs.iter().max_by(|a, b| {
        a.confidence
            .partial_cmp(&b.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    })?;

    let collapsed = best.text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }
    if collapsed.chars().count() > max_len {
        let truncated: String = collapsed.chars().take(max_len).collect();
        Some(format!("{truncated}..."))
    } else {
        Some(collapsed)
    }
}

/// Decode the first readable QR code on the document.
///
/// Certificates frequently carry their verification URL as a QR code, which
/// survives scans that defeat OCR. Unreadable images or absent codes yield
/// `None`.
fn decode_qr_payload(data: &[u8]) -> Option<String> {
    let luma = image::load_from_memory(data).ok()?.to_luma8();
    let mut prepared = rqrr::PreparedImage::prepare(luma);
    for grid in prepared.detect_grids() {
        match grid.decode() {
            Ok((_, content)) if !content.is_empty() => return Some(content),
            Ok(_) => {},
            Err(e) => debug!(error = %e, "QR grid failed to decode"),
        }
    }
    None
}

// ============================================================================
// Field matchers
// ============================================================================

fn static_regex(cell: &'static OnceLock<Regex>, pattern: &'static str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("hard-coded pattern compiles"))
}

/// Recipient name after an award phrase.
fn match_candidate_name(text: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = static_regex(
        &RE,
        r"(?:(?i:certify that|certifies that|is awarded to|awarded to|presented to|granted to|completed by))\s+([A-Z][A-Za-z'.\-]+(?:[ \t]+[A-Z][A-Za-z'.\-]+){1,3})",
    );
    re.captures(text)
        .map(|c| c[1].split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Certificate identifier, tried in order of pattern specificity.
fn match_certificate_id(text: &str) -> Option<String> {
    static UDEMY_RE: OnceLock<Regex> = OnceLock::new();
    static HEX_RE: OnceLock<Regex> = OnceLock::new();
    static LABELED_RE: OnceLock<Regex> = OnceLock::new();
    static BARE_RE: OnceLock<Regex> = OnceLock::new();

    let udemy = static_regex(&UDEMY_RE, r"UC-[A-Za-z0-9|\-]{10,}");
    if let Some(m) = udemy.find(text) {
        return accept_certificate_id(m.as_str());
    }

    let hex = static_regex(&HEX_RE, r"\b[a-f0-9]{32}\b");
    if let Some(m) = hex.find(text) {
        return accept_certificate_id(m.as_str());
    }

    let labeled = static_regex(
        &LABELED_RE,
        r"(?i:certificate|certification|credential)\s*(?i:id|no\.?|number|code)?\s*[:#]\s*([A-Za-z0-9|][A-Za-z0-9|\-]{5,})",
    );
    if let Some(c) = labeled.captures(text) {
        if let Some(id) = accept_certificate_id(&c[1]) {
            return Some(id);
        }
    }

    // Bare uppercase-alphanumeric runs; require a digit so plain words
    // like CERTIFICATE never qualify.
    let bare = static_regex(&BARE_RE, r"\b[A-Z0-9]{10,24}\b");
    bare.find_iter(text)
        .map(|m| m.as_str())
        .find(|s| s.chars().any(|c| c.is_ascii_digit()))
        .and_then(accept_certificate_id)
}

fn accept_certificate_id(raw: &str) -> Option<String> {
    let cleaned = clean_certificate_id(raw);
    if cleaned.len() < 6 {
        return None;
    }
    // Short all-digit strings are reference numbers, not certificate ids.
    if cleaned.len() <= 8 && cleaned.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(cleaned)
}

/// Repair OCR confusables in a certificate id.
///
/// Strips whitespace and fixes the substitutions engines commonly make in
/// light-gray id text: pipe for one, ell and capital i for one when wedged
/// between digits, capital o for zero when adjacent to a zero.
pub(crate) fn clean_certificate_id(raw: &str) -> String {
    let joined: String = raw.split_whitespace().collect();
    let chars: Vec<char> = joined.chars().collect();
    let mut out = String::with_capacity(chars.len());

    for (i, &c) in chars.iter().enumerate() {
        let prev_digit = i > 0 && chars[i - 1].is_ascii_digit();
        let next_digit = chars.get(i + 1).is_some_and(|c| c.is_ascii_digit());
        let prev_zero = i > 0 && chars[i - 1] == '0';
        let next_zero = chars.get(i + 1) == Some(&'0');
        let at_start = i == 0;
        let at_end = i + 1 == chars.len();

        let mapped = match c {
            '|' => '1',
            'l' if (prev_digit && next_digit)
                || (at_start && next_digit)
                || (prev_digit && at_end) =>
            {
                '1'
            },
            'I' if prev_digit && next_digit => '1',
            'O' if prev_zero || next_zero => '0',
            other => other,
        };
        out.push(mapped);
    }
    out
}

/// Known credential platforms, multiword names first.
const KNOWN_ISSUERS: &[&str] = &[
    "LinkedIn Learning",
    "HubSpot Academy",
    "Salesforce Trailhead",
    "Khan Academy",
    "Linux Foundation",
    "Great Learning",
    "DeepLearning.AI",
    "freeCodeCamp",
    "Codecademy",
    "Coursera",
    "Udemy",
    "Udacity",
    "edX",
    "NPTEL",
    "SWAYAM",
    "Pluralsight",
    "Simplilearn",
    "Skillshare",
    "Red Hat",
    "Microsoft",
    "Google",
    "Oracle",
    "Adobe",
    "Cisco",
    "IBM",
    "AWS",
    "Meta",
];

/// Issuing platform, recognized from a fixed table.
fn match_issuer_name(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    KNOWN_ISSUERS
        .iter()
        .find(|name| contains_word(&lower, &name.to_lowercase()))
        .map(|name| (*name).to_string())
}

/// Case-folded substring match with word boundaries on both sides.
fn contains_word(haystack: &str, needle: &str) -> bool {
    let mut from = 0;
    while let Some(pos) = haystack[from..].find(needle) {
        let start = from + pos;
        let end = start + needle.len();
        let before_ok = start == 0
            || !haystack[..start]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric());
        let after_ok = end == haystack.len()
            || !haystack[end..].chars().next().is_some_and(|c| c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        from = end;
    }
    false
}

/// Organization named after an attribution phrase.
fn match_issuer_org(text: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = static_regex(
        &RE,
        r"(?:(?i:issued by|offered by|in partnership with|in collaboration with|authorized by|powered by))\s+([A-Z][A-Za-z0-9&.' -]{2,40})",
    );
    re.captures(text).map(|c| {
        c[1].trim()
            .trim_end_matches(['.', ',', '-'])
            .trim()
            .to_string()
    })
}

/// Verification URL; must normalize to an absolute http(s) URL.
fn match_issuer_url(text: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = static_regex(
        &RE,
        r#"(?i)\bhttps?://[^\s<>"')]+|\bwww\.[^\s<>"')]+|\b[a-z0-9][a-z0-9.\-]*\.(?:com|org|net|io|ai|edu|my)/[^\s<>"')]+"#,
    );

    let candidates: Vec<&str> = re.find_iter(text).map(|m| m.as_str()).collect();
    if candidates.is_empty() {
        return None;
    }

    // Prefer URLs that look like verification links.
    let preferred = candidates.iter().find(|c| {
        let lower = c.to_lowercase();
        ["verify", "certificat", "credential", "accomplishments", "award"]
            .iter()
            .any(|hint| lower.contains(hint))
    });

    preferred
        .or(candidates.first())
        .and_then(|raw| normalize_issuer_url(raw))
}

/// Canonicalize a raw URL token; rejects anything that does not parse as an
/// absolute http(s) URL with a dotted host.
pub(crate) fn normalize_issuer_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_end_matches(['.', ',', ';', ')']);
    if trimmed.is_empty() {
        return None;
    }

    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let url = Url::parse(&with_scheme).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    let host = url.host_str()?;
    if !host.contains('.') {
        return None;
    }
    Some(url.to_string())
}

/// Printed issue or completion date, several common shapes.
fn match_certificate_date(text: &str) -> Option<String> {
    static ISO_RE: OnceLock<Regex> = OnceLock::new();
    static NUMERIC_RE: OnceLock<Regex> = OnceLock::new();
    static MONTH_RE: OnceLock<Regex> = OnceLock::new();

    let iso = static_regex(&ISO_RE, r"\b\d{4}-\d{2}-\d{2}\b");
    if let Some(m) = iso.find(text) {
        return Some(m.as_str().to_string());
    }

    let month = static_regex(
        &MONTH_RE,
        r"(?i)\b(?:(?:jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?\s+\d{1,2},?\s+\d{4}|\d{1,2}\s+(?:jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?\s+\d{4})\b",
    );
    if let Some(m) = month.find(text) {
        return Some(m.as_str().split_whitespace().collect::<Vec<_>>().join(" "));
    }

    let numeric = static_regex(&NUMERIC_RE, r"\b\d{1,2}[/.]\d{1,2}[/.]\d{2,4}\b");
    numeric.find(text).map(|m| m.as_str().to_string())
}
