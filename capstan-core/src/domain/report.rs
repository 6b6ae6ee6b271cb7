//! Coverage report and publish acknowledgement types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Structured format tag for a coverage report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoverageFormat {
    /// Structured XML report, the format the collector ingests
    Xml,
    /// Terminal summary listing uncovered lines
    TermMissing,
}

impl CoverageFormat {
    /// Parse a format name as written in a definition
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "xml" => Some(Self::Xml),
            "term-missing" => Some(Self::TermMissing),
            _ => None,
        }
    }
}

/// Reference to a coverage report produced by the test step
///
/// Produced by the test adapter, consumed by the publisher. The file itself
/// is the only durable state a run creates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageReport {
    pub path: PathBuf,
    pub formats: Vec<CoverageFormat>,
}

/// Acknowledgement returned by the external collector after an upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishAck {
    /// Collector-assigned identifier for the uploaded report
    pub report_id: String,
    /// Destination the report was sent to
    pub destination: String,
}
