//! Common types used across varanno

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Predicted impact category of a variant consequence.
///
/// Variants are ordered by severity, so `Impact::High > Impact::Moderate`
/// and `Impact::Unknown` sorts below everything the upstream can report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Impact {
    /// No impact information was available
    #[default]
    Unknown,
    /// Usually non-coding or intergenic
    Modifier,
    /// Mostly harmless
    Low,
    /// Non-disruptive but may change protein effectiveness
    Moderate,
    /// Assumed disruptive (truncation, loss of function)
    High,
}

impl Impact {
    /// HIGH and MODERATE are the categories reviewers usually triage first.
    pub fn is_damaging(self) -> bool {
        matches!(self, Impact::High | Impact::Moderate)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Impact::High => "HIGH",
            Impact::Moderate => "MODERATE",
            Impact::Low => "LOW",
            Impact::Modifier => "MODIFIER",
            Impact::Unknown => "UNKNOWN",
        }
    }
}

impl std::str::FromStr for Impact {
    type Err = std::convert::Infallible;

    /// Unrecognized labels map to `Unknown` rather than failing, since the
    /// upstream vocabulary can grow between releases.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_uppercase().as_str() {
            "HIGH" => Impact::High,
            "MODERATE" => Impact::Moderate,
            "LOW" => Impact::Low,
            "MODIFIER" => Impact::Modifier,
            _ => Impact::Unknown,
        })
    }
}

impl std::fmt::Display for Impact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized annotation for a single variant.
///
/// # Examples
///
/// ```
/// use varanno_common::types::{AnnotationResult, Impact};
///
/// let result = AnnotationResult::new("stop_gained", Impact::High, "15.8")
///     .with_score(Some(41.0))
///     .with_frequency(Some(0.0002));
///
/// assert_eq!(result.deleteriousness_score, Some(41.0));
/// assert_eq!(result.allele_frequency, Some(0.0002));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationResult {
    /// Most severe consequence term (e.g. "missense_variant")
    pub consequence: String,

    /// Impact category of the most severe consequence
    pub impact: Impact,

    /// Deleteriousness score (CADD phred), when the upstream provided one
    pub deleteriousness_score: Option<f64>,

    /// Population allele frequency in `[0, 1]`, when a frequency source matched
    pub allele_frequency: Option<f64>,

    /// Version of the upstream response schema the result was parsed from
    pub schema_version: String,

    /// When the upstream response was received
    pub fetched_at: DateTime<Utc>,
}

impl AnnotationResult {
    /// Create a result stamped with the current time and no optional scores.
    pub fn new(
        consequence: impl Into<String>,
        impact: Impact,
        schema_version: impl Into<String>,
    ) -> Self {
        Self {
            consequence: consequence.into(),
            impact,
            deleteriousness_score: None,
            allele_frequency: None,
            schema_version: schema_version.into(),
            fetched_at: Utc::now(),
        }
    }

    pub fn with_score(mut self, score: Option<f64>) -> Self {
        self.deleteriousness_score = score.filter(|s| s.is_finite());
        self
    }

    /// Frequencies outside `[0, 1]` are discarded.
    pub fn with_frequency(mut self, frequency: Option<f64>) -> Self {
        self.allele_frequency = frequency.filter(|f| (0.0..=1.0).contains(f));
        self
    }
}
