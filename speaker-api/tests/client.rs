//! Speaker client behaviour against a mocked control endpoint

use mockito::{Matcher, Server};
use rstest::rstest;
use serde_json::json;
use speaker_api::{ApiError, SpeakerClient};
use std::net::SocketAddr;

fn addr(server: &Server) -> SocketAddr {
    server.host_with_port().parse().unwrap()
}

#[tokio::test]
async fn test_toggle_broadcast_sends_flag() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/api/ToggleBroadcast")
        .match_body(Matcher::Json(json!({ "should_broadcast": false })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"return_code":200}"#)
        .create_async()
        .await;

    let client = SpeakerClient::new().unwrap();
    client.toggle_broadcast(addr(&server), false).await.unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_forward_operations() {
    let mut server = Server::new_async().await;
    let add = server
        .mock("POST", "/api/ForwardToNodes")
        .match_body(Matcher::Json(json!({ "ids": ["porch", "den"] })))
        .with_status(200)
        .with_body(r#"{"return_code":200}"#)
        .create_async()
        .await;
    let remove_all = server
        .mock("POST", "/api/RemoveForwardToNodes")
        .match_body(Matcher::Json(json!({ "ids": [], "remove_all": true })))
        .with_status(200)
        .with_body(r#"{"return_code":200}"#)
        .create_async()
        .await;
    let remove_some = server
        .mock("POST", "/api/RemoveForwardToNodes")
        .match_body(Matcher::Json(json!({ "ids": ["den"], "remove_all": false })))
        .with_status(200)
        .with_body(r#"{"return_code":200}"#)
        .create_async()
        .await;

    let client = SpeakerClient::new().unwrap();
    let speaker = addr(&server);
    client
        .forward_to(speaker, vec!["porch".to_string(), "den".to_string()])
        .await
        .unwrap();
    client.remove_all_forward(speaker).await.unwrap();
    client.remove_forward(speaker, vec!["den".to_string()]).await.unwrap();

    add.assert_async().await;
    remove_all.assert_async().await;
    remove_some.assert_async().await;
}

#[rstest]
#[case(404)]
#[case(500)]
#[tokio::test]
async fn test_device_return_code_is_an_error(#[case] code: u16) {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/ChangeServiceName")
        .with_status(200)
        .with_body(format!(r#"{{"return_code":{}}}"#, code))
        .create_async()
        .await;

    let client = SpeakerClient::new().unwrap();
    let result = client.rename(addr(&server), "Living Room").await;

    match result {
        Err(ApiError::Device(returned)) => assert_eq!(returned, code),
        other => panic!("expected a device error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_http_failure_is_a_network_error() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/GetMuted")
        .with_status(503)
        .create_async()
        .await;

    let client = SpeakerClient::new().unwrap();
    let result = client.is_muted(addr(&server)).await;
    assert!(matches!(result, Err(ApiError::Network(_))));
}

#[tokio::test]
async fn test_current_track() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/GetCurrentTrack")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"artist":"The Tragically Hip","album":"Fully Completely","title":"Bobcaygeon","artwork":[1,2,3]}"#)
        .create_async()
        .await;

    let client = SpeakerClient::new().unwrap();
    let track = client.current_track(addr(&server)).await.unwrap();

    assert_eq!(track.artist, "The Tragically Hip");
    assert_eq!(track.title, "Bobcaygeon");
    assert_eq!(track.artwork, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_is_muted() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/GetMuted")
        .with_status(200)
        .with_body(r#"{"is_muted":true}"#)
        .create_async()
        .await;

    let client = SpeakerClient::new().unwrap();
    assert!(client.is_muted(addr(&server)).await.unwrap());
}

#[tokio::test]
async fn test_malformed_reply_is_a_parse_error() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/GetMuted")
        .with_status(200)
        .with_body(r#"{"muted":"maybe"}"#)
        .create_async()
        .await;

    let client = SpeakerClient::new().unwrap();
    let result = client.is_muted(addr(&server)).await;
    assert!(matches!(result, Err(ApiError::Parse(_))));
}

#[tokio::test]
async fn test_unreachable_speaker() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let speaker = listener.local_addr().unwrap();
    drop(listener);

    let client = SpeakerClient::new().unwrap();
    let result = client.toggle_broadcast(speaker, true).await;
    assert!(matches!(result, Err(ApiError::Network(_))));
}
