//! VEP REST endpoint URL builders and request bodies

use serde::Serialize;

use crate::detect::{Variant, VariantKind};

/// Plugin and frequency flags requested on every call.
const ANNOTATION_PARAMS: &str = "CADD=1&af_gnomade=1&af_gnomadg=1";

/// Build the coordinate (region) endpoint URL
pub fn region_url(base_url: &str, species: &str) -> String {
    format!(
        "{}/vep/{}/region?{}",
        base_url.trim_end_matches('/'),
        species,
        ANNOTATION_PARAMS
    )
}

/// Build the transcript-change (HGVS) endpoint URL
pub fn hgvs_url(base_url: &str, species: &str) -> String {
    format!(
        "{}/vep/{}/hgvs?{}",
        base_url.trim_end_matches('/'),
        species,
        ANNOTATION_PARAMS
    )
}

/// POST body for either endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum VepRequest {
    Region { variants: Vec<String> },
    Hgvs { hgvs_notations: Vec<String> },
}

/// Pick the endpoint and body for a variant.
pub fn request_for(base_url: &str, species: &str, variant: &Variant) -> (String, VepRequest) {
    match variant.kind() {
        VariantKind::Coordinate(c) => (
            region_url(base_url, species),
            VepRequest::Region {
                // VCF-style line: CHROM POS ID REF ALT QUAL FILTER INFO
                variants: vec![format!(
                    "{} {} . {} {} . . .",
                    c.chrom, c.pos, c.reference, c.alternate
                )],
            },
        ),
        VariantKind::TranscriptChange(t) => (
            hgvs_url(base_url, species),
            VepRequest::Hgvs {
                hgvs_notations: vec![t.to_string()],
            },
        ),
    }
}
