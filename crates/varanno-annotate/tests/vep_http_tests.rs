//! Annotation client tests against a mock VEP server
//!
//! These tests exercise the HTTP oracle end to end:
//! - Endpoint selection and request bodies
//! - Result normalization
//! - Throttling and error status mapping
//! - Deadline handling and caching

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use varanno_annotate::oracle::HttpVepOracle;
use varanno_annotate::{AnnotateError, AnnotationClient};
use varanno_common::Impact;
use wiremock::{
    matchers::{body_json, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

/// Helper to build a client pointed at the mock server
fn client_for(server: &MockServer) -> AnnotationClient {
    let oracle = HttpVepOracle::new(server.uri(), "homo_sapiens", "15.8").unwrap();
    AnnotationClient::builder(Arc::new(oracle))
        .request_timeout(Duration::from_millis(500))
        .build()
}

/// Helper to create a VEP region response for BRCA1
fn brca1_response() -> serde_json::Value {
    json!([{
        "input": "17 41234470 . T A . . .",
        "assembly_name": "GRCh38",
        "seq_region_name": "17",
        "start": 41234470,
        "end": 41234470,
        "allele_string": "T/A",
        "most_severe_consequence": "missense_variant",
        "transcript_consequences": [
            {
                "transcript_id": "ENST00000357654",
                "gene_symbol": "BRCA1",
                "impact": "MODERATE",
                "consequence_terms": ["missense_variant"],
                "cadd_phred": 28.5,
                "cadd_raw": 4.1
            },
            {
                "transcript_id": "ENST00000461221",
                "gene_symbol": "BRCA1",
                "impact": "MODIFIER",
                "consequence_terms": ["non_coding_transcript_exon_variant"]
            }
        ],
        "colocated_variants": [
            {
                "id": "rs80357906",
                "allele_string": "T/A/G",
                "frequencies": {
                    "A": { "gnomade": 0.0001, "gnomadg": 0.00013 }
                }
            }
        ]
    }])
}

// ============================================================================
// Successful Annotation
// ============================================================================

#[tokio::test]
async fn test_coordinate_annotation_end_to_end() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/vep/homo_sapiens/region"))
        .and(query_param("CADD", "1"))
        .and(body_json(json!({ "variants": ["17 41234470 . T A . . ."] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(brca1_response()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let result = client.annotate("17:41234470:T:A").await.unwrap();

    assert_eq!(result.consequence, "missense_variant");
    assert_eq!(result.impact, Impact::Moderate);
    assert_eq!(result.deleteriousness_score, Some(28.5));
    assert_eq!(result.allele_frequency, Some(0.0001));
    assert_eq!(result.schema_version, "15.8");
}

#[tokio::test]
async fn test_transcript_change_uses_hgvs_endpoint() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/vep/homo_sapiens/hgvs"))
        .and(body_json(json!({ "hgvs_notations": ["NM_000492.3:c.1521_1523del"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "most_severe_consequence": "inframe_deletion",
            "transcript_consequences": [
                { "gene_symbol": "CFTR", "impact": "MODERATE",
                  "consequence_terms": ["inframe_deletion"], "cadd_phred": 22.1 }
            ]
        }])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let result = client.annotate("NM_000492.3:c.1521_1523del").await.unwrap();

    assert_eq!(result.consequence, "inframe_deletion");
    assert_eq!(result.deleteriousness_score, Some(22.1));
    assert_eq!(result.allele_frequency, None);
}

#[tokio::test]
async fn test_warm_cache_skips_upstream() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/vep/homo_sapiens/region"))
        .respond_with(ResponseTemplate::new(200).set_body_json(brca1_response()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let first = client.annotate("17:41234470:T:A").await.unwrap();
    let second = client.annotate("chr17:41234470:t:a").await.unwrap();

    assert_eq!(first, second);
}

// ============================================================================
// Error Handling
// ============================================================================

#[tokio::test]
async fn test_invalid_input_never_reaches_server() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(brca1_response()))
        .expect(0)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let err = client.annotate("not-a-variant").await.unwrap_err();

    assert!(matches!(err, AnnotateError::InvalidFormat(_)));
    assert!(client.cache().is_empty());
}

#[tokio::test]
async fn test_too_many_requests_is_throttled() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "2"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let err = client.annotate("17:41234470:T:A").await.unwrap_err();

    assert_eq!(
        err,
        AnnotateError::UpstreamThrottled {
            retry_after: Some(Duration::from_secs(2))
        }
    );
}

#[tokio::test]
async fn test_unavailable_with_retry_after_is_throttled() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).insert_header("Retry-After", "5"))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let err = client.annotate("17:41234470:T:A").await.unwrap_err();

    assert_eq!(err.retry_after(), Some(Duration::from_secs(5)));
}

#[tokio::test]
async fn test_server_error_is_upstream_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({ "error": "Unable to parse HGVS notation" })),
        )
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let err = client.annotate("NM_000492.3:c.bogus").await.unwrap_err();

    match err {
        AnnotateError::UpstreamError(message) => {
            assert!(message.contains("400"), "{}", message);
            assert!(message.contains("Unable to parse HGVS notation"), "{}", message);
        },
        other => panic!("expected upstream error, got {:?}", other),
    }
    assert!(client.cache().is_empty());
}

#[tokio::test]
async fn test_empty_response_is_upstream_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let err = client.annotate("17:41234470:T:A").await.unwrap_err();

    assert!(matches!(err, AnnotateError::UpstreamError(_)));
}

#[tokio::test]
async fn test_malformed_body_is_upstream_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let err = client.annotate("17:41234470:T:A").await.unwrap_err();

    assert!(matches!(err, AnnotateError::UpstreamError(_)));
}

#[tokio::test]
async fn test_slow_server_times_out() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(brca1_response())
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let err = client.annotate("17:41234470:T:A").await.unwrap_err();

    assert_eq!(err, AnnotateError::Timeout(Duration::from_millis(500)));
    assert!(client.cache().is_empty());
}
