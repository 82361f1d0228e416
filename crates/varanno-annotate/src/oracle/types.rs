//! VEP response types
//!
//! Only the fields this crate reads are modelled; everything else in the
//! upstream payload is ignored during deserialization.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use varanno_common::Impact;

/// One element of the VEP response array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VepRecord {
    /// Input line echoed back by the upstream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,

    /// `REF/ALT` in VEP's trimmed notation, e.g. `T/A` or `A/-`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allele_string: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub most_severe_consequence: Option<String>,

    #[serde(default)]
    pub transcript_consequences: Vec<TranscriptConsequence>,

    #[serde(default)]
    pub regulatory_feature_consequences: Vec<FeatureConsequence>,

    #[serde(default)]
    pub intergenic_consequences: Vec<FeatureConsequence>,

    /// Known variants at the same position, carrying population frequencies
    #[serde(default)]
    pub colocated_variants: Vec<ColocatedVariant>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptConsequence {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gene_symbol: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact: Option<String>,

    #[serde(default)]
    pub consequence_terms: Vec<String>,

    /// CADD phred score, present when the CADD plugin ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cadd_phred: Option<f64>,
}

/// Regulatory or intergenic consequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureConsequence {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact: Option<String>,

    #[serde(default)]
    pub consequence_terms: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColocatedVariant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// allele -> source (e.g. "gnomade") -> frequency.
    ///
    /// Values are kept as JSON so an unexpected non-numeric entry does not
    /// fail the whole response.
    #[serde(default)]
    pub frequencies: BTreeMap<String, BTreeMap<String, serde_json::Value>>,
}

impl VepRecord {
    fn impacts(&self) -> impl Iterator<Item = Option<&str>> {
        self.transcript_consequences
            .iter()
            .map(|c| c.impact.as_deref())
            .chain(self.regulatory_feature_consequences.iter().map(|c| c.impact.as_deref()))
            .chain(self.intergenic_consequences.iter().map(|c| c.impact.as_deref()))
    }

    fn consequence_terms(&self) -> impl Iterator<Item = &str> {
        self.transcript_consequences
            .iter()
            .flat_map(|c| c.consequence_terms.iter())
            .chain(
                self.regulatory_feature_consequences
                    .iter()
                    .flat_map(|c| c.consequence_terms.iter()),
            )
            .chain(
                self.intergenic_consequences
                    .iter()
                    .flat_map(|c| c.consequence_terms.iter()),
            )
            .map(String::as_str)
    }

    /// The upstream's most severe consequence, or the first term reported
    /// on any consequence when the summary field is absent.
    pub fn consequence(&self) -> Option<&str> {
        self.most_severe_consequence
            .as_deref()
            .filter(|c| !c.is_empty())
            .or_else(|| self.consequence_terms().next())
    }

    /// Most severe impact across all consequences; `Unknown` when none carry one.
    pub fn most_severe_impact(&self) -> Impact {
        self.impacts()
            .flatten()
            .filter_map(|label| label.parse::<Impact>().ok())
            .max()
            .unwrap_or_default()
    }

    /// Score of the first transcript consequence that carries one.
    pub fn deleteriousness_score(&self) -> Option<f64> {
        self.transcript_consequences
            .iter()
            .find_map(|c| c.cadd_phred.filter(|s| s.is_finite()))
    }

    /// The single alternate allele in `allele_string`; `None` when the
    /// record reports several or none.
    pub fn reported_alternate(&self) -> Option<&str> {
        let mut alternates = self.allele_string.as_deref()?.split('/').skip(1);
        let alternate = alternates.next().filter(|a| !a.is_empty())?;
        alternates.next().is_none().then_some(alternate)
    }

    /// Frequency of exactly `allele`, from the highest-priority source that
    /// reports one. Other alleles at the same position are never used.
    pub fn allele_frequency(&self, allele: &str, sources: &[String]) -> Option<f64> {
        sources.iter().find_map(|source| {
            self.colocated_variants
                .iter()
                .find_map(|colocated| colocated.frequency(allele, source))
        })
    }
}

impl ColocatedVariant {
    fn frequency(&self, allele: &str, source: &str) -> Option<f64> {
        self.frequencies
            .get(allele)?
            .get(source)
            .and_then(serde_json::Value::as_f64)
            .filter(|f| (0.0..=1.0).contains(f))
    }
}
