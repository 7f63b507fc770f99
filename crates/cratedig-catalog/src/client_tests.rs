// SPDX-License-Identifier: GPL-3.0-or-later

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::models::SearchKind;
use crate::CatalogClient;

fn track_response() -> serde_json::Value {
    serde_json::json!({
        "id": "123",
        "title": "Paranoid Android",
        "artists": ["Radiohead"],
        "albums": ["OK Computer"],
        "album_id": "456",
        "isrc": "GBUM71029604",
    })
}

#[tokio::test]
async fn get_track_accepts_numeric_or_string_ids() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tracks/123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(track_response()))
        .mount(&mock_server)
        .await;

    let client = CatalogClient::new(mock_server.uri(), Duration::from_millis(1)).unwrap();
    let cancel = CancellationToken::new();
    let track = client.get_track("123", &cancel).await.unwrap();

    assert_eq!(track.id, "123");
    assert_eq!(track.title.as_deref(), Some("Paranoid Android"));
    assert_eq!(track.album_id.as_deref(), Some("456"));
}

#[tokio::test]
async fn search_sends_query_and_kind() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/tracks"))
        .and(query_param("query", "Radiohead"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "tracks": [track_response()]
        })))
        .mount(&mock_server)
        .await;

    let client = CatalogClient::new(mock_server.uri(), Duration::from_millis(1)).unwrap();
    let cancel = CancellationToken::new();
    let results = client
        .search("Radiohead", SearchKind::Track, &cancel)
        .await
        .unwrap();

    assert_eq!(results.tracks.len(), 1);
}

#[tokio::test]
async fn not_found_is_reported_without_retry() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tracks/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = CatalogClient::new(mock_server.uri(), Duration::from_millis(1)).unwrap();
    let cancel = CancellationToken::new();
    let result = client.get_track("missing", &cancel).await;

    assert!(matches!(result, Err(crate::CatalogError::NotFound(_))));
}

#[tokio::test]
async fn service_unavailable_retries_then_exhausts() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tracks/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let client = CatalogClient::new(mock_server.uri(), Duration::from_millis(1)).unwrap();
    let cancel = CancellationToken::new();
    let result = client.get_track("flaky", &cancel).await;

    assert!(matches!(
        result,
        Err(crate::CatalogError::RetriesExhausted { .. })
    ));
}

#[tokio::test]
async fn cancellation_aborts_before_any_request() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tracks/123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(track_response()))
        .expect(0)
        .mount(&mock_server)
        .await;

    let client = CatalogClient::new(mock_server.uri(), Duration::from_secs(5)).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = client.get_track("123", &cancel).await;
    assert!(matches!(result, Err(crate::CatalogError::Cancelled)));
}
