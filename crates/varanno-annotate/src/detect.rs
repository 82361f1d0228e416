//! Variant format detection
//!
//! Classifies raw variant strings as genomic coordinates
//! (`17:41234470:T:A`, `chrX-1000-G-<DEL>`) or transcript changes
//! (`NM_000492.3:c.1521_1523del`, `ENSP00000349468:p.Arg117His`), and derives
//! the canonical key used to deduplicate cache entries across spellings.

use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use regex::Regex;

#[allow(clippy::expect_used)]
static COORDINATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:chr)?(2[0-2]|1[0-9]|[1-9]|X|Y|MT|M)[:_-]0*([1-9][0-9]*)[:_-]([ACGTN]+)[:_-]([ACGTN]+|\*|<[A-Z0-9:._-]+>)$",
    )
    .expect("coordinate pattern is a valid regex")
});

#[allow(clippy::expect_used)]
static TRANSCRIPT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^((?i:(?:N[MRPCG]|X[MRP])_[0-9]+|ENS[TP][0-9]+)(?:\.[0-9]+)?):([cnpg])\.(\S+)$",
    )
    .expect("transcript pattern is a valid regex")
});

/// Detected input notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantFormat {
    /// `chrom:pos:ref:alt`, optionally `chr`-prefixed
    Coordinate,
    /// `accession:c.change` / `accession:p.change`
    TranscriptChange,
    Invalid,
}

impl std::fmt::Display for VariantFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VariantFormat::Coordinate => write!(f, "coordinate"),
            VariantFormat::TranscriptChange => write!(f, "transcript_change"),
            VariantFormat::Invalid => write!(f, "invalid"),
        }
    }
}

/// Genomic position with reference and alternate alleles, normalized to
/// upper case with the `chr` prefix stripped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenomicCoordinate {
    pub chrom: String,
    pub pos: u64,
    pub reference: String,
    pub alternate: String,
}

impl GenomicCoordinate {
    /// Bracketed alternates such as `<DEL>` describe structural variants.
    pub fn is_structural(&self) -> bool {
        self.alternate.starts_with('<')
    }

    /// Alternate allele as VEP reports it in frequency tables.
    ///
    /// A leading base shared by reference and alternate is dropped, and an
    /// allele left empty is written `-`, so `TA>T` becomes `-` and `G>GA`
    /// becomes `A`. Structural and spanning-deletion alternates have no
    /// frequency allele.
    pub fn frequency_allele(&self) -> Option<String> {
        if self.is_structural() || self.alternate == "*" {
            return None;
        }

        let shares_first_base = self.reference.as_bytes().first().is_some()
            && self.reference.as_bytes().first() == self.alternate.as_bytes().first();
        let allele = if shares_first_base {
            &self.alternate[1..]
        } else {
            self.alternate.as_str()
        };

        Some(if allele.is_empty() {
            "-".to_string()
        } else {
            allele.to_string()
        })
    }
}

/// Change expression relative to a transcript or protein accession.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TranscriptChange {
    pub accession: String,
    /// One of `c`, `n`, `p`, `g`
    pub change_type: char,
    pub change: String,
}

impl std::fmt::Display for TranscriptChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}.{}", self.accession, self.change_type, self.change)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VariantKind {
    Coordinate(GenomicCoordinate),
    TranscriptChange(TranscriptChange),
}

/// A successfully detected variant together with its canonical key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Variant {
    kind: VariantKind,
    key: String,
}

impl Variant {
    pub fn kind(&self) -> &VariantKind {
        &self.kind
    }

    pub fn format(&self) -> VariantFormat {
        match self.kind {
            VariantKind::Coordinate(_) => VariantFormat::Coordinate,
            VariantKind::TranscriptChange(_) => VariantFormat::TranscriptChange,
        }
    }

    /// Normalized spelling shared by every equivalent input.
    pub fn canonical_key(&self) -> &str {
        &self.key
    }

    /// Frequency-table allele for coordinate input. Transcript changes carry
    /// the allele inside the change expression, so this is `None` for them.
    pub fn frequency_allele(&self) -> Option<String> {
        match &self.kind {
            VariantKind::Coordinate(c) => c.frequency_allele(),
            VariantKind::TranscriptChange(_) => None,
        }
    }
}

/// One caller-supplied variant string after detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantQuery {
    raw: String,
    variant: Option<Variant>,
}

impl VariantQuery {
    pub fn parse(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            variant: parse_variant(raw.trim()),
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn format(&self) -> VariantFormat {
        self.variant
            .as_ref()
            .map_or(VariantFormat::Invalid, Variant::format)
    }

    pub fn canonical_key(&self) -> Option<&str> {
        self.variant.as_ref().map(Variant::canonical_key)
    }

    pub fn variant(&self) -> Option<&Variant> {
        self.variant.as_ref()
    }

    pub fn into_variant(self) -> Option<Variant> {
        self.variant
    }
}

/// Classify a raw variant string.
///
/// ```
/// use varanno_annotate::detect::{detect, VariantFormat};
///
/// assert_eq!(detect("chr17:41234470:T:A"), VariantFormat::Coordinate);
/// assert_eq!(detect("NM_007294.4:c.5266dupC"), VariantFormat::TranscriptChange);
/// assert_eq!(detect("not-a-variant"), VariantFormat::Invalid);
/// ```
pub fn detect(raw: &str) -> VariantFormat {
    VariantQuery::parse(raw).format()
}

fn parse_variant(input: &str) -> Option<Variant> {
    parse_coordinate(input)
        .map(VariantKind::Coordinate)
        .or_else(|| parse_transcript_change(input).map(VariantKind::TranscriptChange))
        .map(|kind| {
            let key = canonical_key(&kind);
            Variant { kind, key }
        })
}

fn parse_coordinate(input: &str) -> Option<GenomicCoordinate> {
    let caps = COORDINATE_PATTERN.captures(input)?;

    let mut chrom = caps[1].to_ascii_uppercase();
    if chrom == "M" {
        chrom = "MT".to_string();
    }
    let pos: u64 = caps[2].parse().ok()?;
    let reference = caps[3].to_ascii_uppercase();
    let alternate = caps[4].to_ascii_uppercase();

    // Identical alleles describe no change at all.
    if reference == alternate {
        return None;
    }

    Some(GenomicCoordinate {
        chrom,
        pos,
        reference,
        alternate,
    })
}

fn parse_transcript_change(input: &str) -> Option<TranscriptChange> {
    let caps = TRANSCRIPT_PATTERN.captures(input)?;
    let change_type = caps[2].chars().next()?;

    Some(TranscriptChange {
        accession: caps[1].to_ascii_uppercase(),
        change_type,
        change: caps[3].to_string(),
    })
}

fn canonical_key(kind: &VariantKind) -> String {
    match kind {
        VariantKind::Coordinate(c) => {
            format!("{}:{}:{}:{}", c.chrom, c.pos, c.reference, c.alternate)
        },
        VariantKind::TranscriptChange(t) => t.to_string(),
    }
}
