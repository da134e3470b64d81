//! Request and outcome types shared by the pipeline and the transport.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A pull request to analyze.
///
/// Both archives are `base64(gzip(tar))`. An empty `base` means there is no
/// baseline and every finding in `head` is reported.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanRequest {
    /// Pre-change tree. May be empty if we only want the current status.
    #[serde(default)]
    pub base: String,

    /// Post-change tree. Required.
    #[serde(default)]
    pub head: String,
}

impl ScanRequest {
    /// Build a request from a head archive alone.
    #[must_use]
    pub fn head_only(head: impl Into<String>) -> Self {
        Self {
            base: String::new(),
            head: head.into(),
        }
    }

    /// Whether a baseline scan should run.
    #[must_use]
    pub fn has_base(&self) -> bool {
        !self.base.is_empty()
    }
}

/// Result of the two-phase scan.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanOutcome {
    /// True when the head scan reported unsuppressed findings.
    pub has_findings: bool,

    /// Raw scanner report for the head tree; empty when clean.
    pub findings: String,
}

impl ScanOutcome {
    /// Outcome for a head tree with nothing new to report.
    #[must_use]
    pub const fn clean() -> Self {
        Self {
            has_findings: false,
            findings: String::new(),
        }
    }

    /// Outcome carrying the scanner's report verbatim.
    #[must_use]
    pub fn with_findings(report: impl Into<String>) -> Self {
        Self {
            has_findings: true,
            findings: report.into(),
        }
    }
}

/// Response body for a completed analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResponse {
    /// Scanner report; empty string means no findings.
    #[serde(rename = "simpleFindings")]
    pub simple_findings: String,
}

impl From<ScanOutcome> for ScanResponse {
    fn from(outcome: ScanOutcome) -> Self {
        Self {
            simple_findings: if outcome.has_findings {
                outcome.findings
            } else {
                String::new()
            },
        }
    }
}

/// Which of the two trees an operation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanPhase {
    /// The pre-change tree, scanned to build the baseline.
    Base,
    /// The post-change tree, scanned against the baseline.
    Head,
}

impl ScanPhase {
    /// Lowercase name, also the subdirectory name inside a workspace.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Head => "head",
        }
    }
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
