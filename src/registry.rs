//! Trusted issuer domain registry.
//!
//! A small in-memory set of credential platform domains. Matching is by
//! exact domain or any subdomain, after normalization strips scheme, path,
//! port, and a leading `www.`. Deployments can replace the built-in list by
//! loading a registry file (one domain per line, `#` comments, commas also
//! accepted as separators so exported CSV rows load unchanged).

use std::collections::BTreeSet;
use std::path::Path;

use tracing::{debug, warn};
use url::Url;

use crate::error::PipelineError;

/// Platforms trusted out of the box.
const BUILTIN_DOMAINS: &[&str] = &[
    "udemy.com",
    "ude.my",
    "coursera.org",
    "edx.org",
    "credentials.edx.org",
    "linkedin.com",
    "credly.com",
    "youracclaim.com",
    "hubspot.com",
    "academy.hubspot.com",
    "skillshop.exceedlms.com",
    "cloudskillsboost.google",
    "freecodecamp.org",
    "udacity.com",
    "futurelearn.com",
    "pluralsight.com",
    "simplilearn.com",
    "mygreatlearning.com",
    "nptel.ac.in",
    "swayam.gov.in",
    "trailhead.salesforce.com",
    "microsoft.com",
    "ibm.com",
    "aws.amazon.com",
];

/// Registry of issuer domains the pipeline will accept as trusted.
#[derive(Debug, Clone)]
pub struct TrustedDomainRegistry {
    domains: BTreeSet<String>,
}

impl Default for TrustedDomainRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TrustedDomainRegistry {
    /// Registry seeded with the built-in platform list.
    #[must_use]
    pub fn builtin() -> Self {
        Self::with_domains(BUILTIN_DOMAINS.iter().copied())
    }

    /// Registry over an explicit domain list.
    pub fn with_domains<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let domains: BTreeSet<String> = domains
            .into_iter()
            .filter_map(|d| normalize_domain(d.as_ref()))
            .collect();
        Self { domains }
    }

    /// Load a registry from a file, one domain per line.
    ///
    /// Blank lines and `#` comments are skipped; unparseable entries are
    /// logged and dropped rather than failing the load.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the file cannot be read or yields
    /// no usable domains.
    pub fn from_path(path: &Path) -> Result<Self, PipelineError> {
        let contents = std::fs::read_to_string(path).map_err(|e| PipelineError::Config {
            message: format!("cannot read registry file {}: {e}", path.display()),
        })?;

        let mut domains = BTreeSet::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            for entry in line.split(',') {
                let entry = entry.trim();
                if entry.is_empty() {
                    continue;
                }
                match normalize_domain(entry) {
                    Some(domain) => {
                        domains.insert(domain);
                    },
                    None => warn!(entry, "Skipping unparseable registry entry"),
                }
            }
        }

        if domains.is_empty() {
            return Err(PipelineError::Config {
                message: format!("registry file {} contains no domains", path.display()),
            });
        }

        debug!(count = domains.len(), "Loaded trusted domain registry");
        Ok(Self { domains })
    }

    /// Number of registered domains.
    #[must_use]
    pub fn len(&self) -> usize {
        self.domains.len()
    }

    /// True when the registry holds no domains.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Whether the given host is a trusted domain or a subdomain of one.
    #[must_use]
    pub fn is_trusted(&self, host: &str) -> bool {
        let Some(host) = normalize_domain(host) else {
            return false;
        };
        self.domains
            .iter()
            .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")))
    }

    /// Whether the URL's host is trusted. Unparseable URLs are never trusted.
    #[must_use]
    pub fn is_trusted_url(&self, url: &str) -> bool {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| self.is_trusted(h)))
            .unwrap_or(false)
    }
}

/// Normalize a registry entry or host to a bare lowercase domain.
///
/// Accepts full URLs, hosts with ports, and `www.` prefixes. Returns `None`
/// for entries with no dotted hostname.
fn normalize_domain(raw: &str) -> Option<String> {
    let raw = raw.trim().to_lowercase();
    if raw.is_empty() {
        return None;
    }

    let host = if raw.contains("://") {
        Url::parse(&raw).ok()?.host_str()?.to_string()
    } else {
        // Bare entry; cut path and port by hand.
        let no_path = raw.split('/').next().unwrap_or(&raw);
        no_path.split(':').next().unwrap_or(no_path).to_string()
    };

    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    if !host.contains('.') {
        return None;
    }
    Some(host)
}
