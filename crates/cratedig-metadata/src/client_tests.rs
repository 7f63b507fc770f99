// SPDX-License-Identifier: GPL-3.0-or-later

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::MetadataClient;

fn recording_response() -> serde_json::Value {
    serde_json::json!({
        "id": "rec-1",
        "title": "Paranoid Android",
        "artist-credit": [
            {"name": "Radiohead", "artist": {"id": "artist-1"}}
        ],
        "releases": [
            {
                "id": "rel-1",
                "title": "OK Computer",
                "date": "1997-05-21",
                "barcode": "724352210123",
                "label-info": [
                    {"catalog-number": "CDPARLOPHONE", "label": {"name": "Parlophone"}}
                ],
                "release-group": {"id": "rg-1", "primary-type": "Album"}
            }
        ]
    })
}

#[tokio::test]
async fn get_recording_prefers_id_lookup() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/recording/rec-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(recording_response()))
        .mount(&mock_server)
        .await;

    let client = MetadataClient::new(mock_server.uri(), Duration::from_millis(1)).unwrap();
    let cancel = CancellationToken::new();
    let metadata = client
        .get_recording(&cancel, Some("rec-1"), Some("GBUM71029604"), Some("Paranoid Android"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(metadata.artists, vec!["Radiohead".to_string()]);
    assert_eq!(metadata.album.as_deref(), Some("OK Computer"));
    assert_eq!(metadata.label.as_deref(), Some("Parlophone"));
    assert_eq!(metadata.catalog_number.as_deref(), Some("CDPARLOPHONE"));
    assert_eq!(metadata.barcode.as_deref(), Some("724352210123"));
    assert_eq!(metadata.release_type.as_deref(), Some("Album"));
    assert_eq!(metadata.year, Some(1997));
}

#[tokio::test]
async fn falls_back_to_isrc_search_when_id_lookup_missing() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/recording/rec-missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/recording"))
        .and(query_param("query", "isrc:GBUM71029604"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "recordings": [recording_response()]
        })))
        .mount(&mock_server)
        .await;

    let client = MetadataClient::new(mock_server.uri(), Duration::from_millis(1)).unwrap();
    let cancel = CancellationToken::new();
    let metadata = client
        .get_recording(&cancel, Some("rec-missing"), Some("GBUM71029604"), None)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(metadata.album.as_deref(), Some("OK Computer"));
}

#[tokio::test]
async fn no_match_returns_none_not_an_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/recording"))
        .and(query_param("query", "isrc:UNKNOWN"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "recordings": []
        })))
        .mount(&mock_server)
        .await;

    let client = MetadataClient::new(mock_server.uri(), Duration::from_millis(1)).unwrap();
    let cancel = CancellationToken::new();
    let metadata = client
        .get_recording(&cancel, None, Some("UNKNOWN"), None)
        .await
        .unwrap();

    assert!(metadata.is_none());
}

#[tokio::test]
async fn service_unavailable_retries_then_exhausts() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/recording/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let client = MetadataClient::new(mock_server.uri(), Duration::from_millis(1)).unwrap();
    let cancel = CancellationToken::new();
    let result = client.get_recording(&cancel, Some("flaky"), None, None).await;

    assert!(matches!(
        result,
        Err(crate::MetadataError::RetriesExhausted { .. })
    ));
}

#[tokio::test]
async fn rate_limited_response_succeeds_on_retry_honoring_retry_after() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/recording/rec-1"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/recording/rec-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(recording_response()))
        .mount(&mock_server)
        .await;

    let client = MetadataClient::new(mock_server.uri(), Duration::from_millis(1)).unwrap();
    let cancel = CancellationToken::new();
    let metadata = client
        .get_recording(&cancel, Some("rec-1"), None, None)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(metadata.album.as_deref(), Some("OK Computer"));
}

#[tokio::test]
async fn no_ids_given_returns_none_without_requests() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let client = MetadataClient::new(mock_server.uri(), Duration::from_millis(1)).unwrap();
    let cancel = CancellationToken::new();
    let metadata = client.get_recording(&cancel, None, None, None).await.unwrap();

    assert!(metadata.is_none());
}
