//! Ephemeral-token flow and HTTP surface tests

use axum::body::{Body, to_bytes};
use axum::extract::connect_info::MockConnectInfo;
use http::{Request, StatusCode};
use serde_json::{Value, json};
use std::net::SocketAddr;
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use auraq_voice_relay::relay::RelayMode;
use auraq_voice_relay::{AppState, ServerConfig, create_app};

fn token_config(sessions_url: String) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.relay_mode = RelayMode::EphemeralToken;
    config.openai_api_key = Some("sk-test".to_string());
    config.upstream_sessions_url = sessions_url;
    config.rate_limit_requests_per_second = 100_000;
    config
}

fn app(config: ServerConfig) -> axum::Router {
    create_app(AppState::new(config).unwrap())
        .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 5000))))
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), 1 << 20).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_session() -> Request<Body> {
    Request::post("/session").body(Body::empty()).unwrap()
}

#[tokio::test]
async fn returns_provider_session_verbatim() {
    let provider = MockServer::start().await;
    let session = json!({
        "id": "sess_001",
        "object": "realtime.session",
        "model": "gpt-4o-realtime-preview-2024-10-01",
        "expires_at": 1_700_000_000u64,
        "client_secret": {"value": "ek_abc123", "expires_at": 1_700_000_060u64}
    });

    Mock::given(method("POST"))
        .and(path("/v1/realtime/sessions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-realtime-preview-2024-10-01",
            "voice": "alloy",
            "modalities": ["text", "audio"],
            "input_audio_format": "pcm16",
            "output_audio_format": "pcm16",
            "input_audio_transcription": {"model": "whisper-1"},
            "turn_detection": {"type": "server_vad"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(session.clone()))
        .expect(1)
        .mount(&provider)
        .await;

    let response = app(token_config(format!("{}/v1/realtime/sessions", provider.uri())))
        .oneshot(post_session())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, session);
}

#[tokio::test]
async fn provider_rejection_maps_to_bad_gateway() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"type": "invalid_request_error", "message": "Incorrect API key provided"}
        })))
        .mount(&provider)
        .await;

    let response = app(token_config(format!("{}/v1/realtime/sessions", provider.uri())))
        .oneshot(post_session())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = json_body(response).await;
    assert_eq!(body["upstream_status"], 401);
    assert_eq!(
        body["upstream_error"]["error"]["message"],
        "Incorrect API key provided"
    );
}

#[tokio::test]
async fn missing_credential_is_a_server_error_without_upstream_call() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&provider)
        .await;

    let mut config = token_config(format!("{}/v1/realtime/sessions", provider.uri()));
    config.openai_api_key = None;

    let response = app(config).oneshot(post_session()).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("OPENAI_API_KEY"));
}

#[tokio::test]
async fn health_reports_mode() {
    let response = app(token_config("http://127.0.0.1:9/v1/realtime/sessions".to_string()))
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({"status": "OK", "mode": "ephemeral_token"})
    );
}
