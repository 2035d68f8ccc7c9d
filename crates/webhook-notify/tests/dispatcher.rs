//! Delivery tests for WebhookDispatcher against a mock sink.

use std::time::Duration;

use webhook_notify::{
    NotificationPayload, NotifyError, PayloadLimits, WebhookConfig, WebhookDispatcher,
};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn dispatcher() -> WebhookDispatcher {
    let config = WebhookConfig::default().with_retry_backoff(Duration::from_millis(10));
    WebhookDispatcher::new(config).expect("client")
}

fn payload() -> NotificationPayload {
    NotificationPayload::new("Agent evaluation: passed", "- ✅ relevance: 0.90 (>= 0.80)")
        .with_field("Branch", "main")
        .with_action("View results", "https://ci.example.com/runs/7")
}

#[tokio::test]
async fn delivers_on_first_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(serde_json::json!({
            "header": "Agent evaluation: passed"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let result = dispatcher()
        .send(&payload(), &format!("{}/hook", server.uri()))
        .await
        .expect("delivered");
    assert_eq!(result.status, 200);
    assert_eq!(result.attempts, 1);
}

#[tokio::test]
async fn retries_once_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let result = dispatcher()
        .send(&payload(), &server.uri())
        .await
        .expect("delivered after retry");
    assert_eq!(result.status, 204);
    assert_eq!(result.attempts, 2);
}

#[tokio::test]
async fn two_failures_surface_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid_blocks"))
        .expect(2)
        .mount(&server)
        .await;

    let err = dispatcher()
        .send(&payload(), &server.uri())
        .await
        .unwrap_err();
    match err {
        NotifyError::Delivery {
            status,
            body,
            attempts,
        } => {
            assert_eq!(status, Some(400));
            assert_eq!(body, "invalid_blocks");
            assert_eq!(attempts, 2);
        }
        other => panic!("expected Delivery, got {other:?}"),
    }
}

#[tokio::test]
async fn invalid_payload_is_never_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let limits = PayloadLimits {
        max_body_bytes: 8,
        max_payload_bytes: 4000,
    };
    let config = WebhookConfig::default().with_limits(limits);
    let dispatcher = WebhookDispatcher::new(config).expect("client");

    let err = dispatcher
        .send(&payload(), &server.uri())
        .await
        .unwrap_err();
    assert!(err.is_local());
}

#[tokio::test]
async fn malformed_destination_is_rejected() {
    let err = dispatcher().send(&payload(), "not a url").await.unwrap_err();
    assert!(matches!(err, NotifyError::InvalidPayload(_)));
}

#[tokio::test]
async fn connection_failure_is_retried_once() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    };

    let err = dispatcher()
        .send(&payload(), &format!("http://127.0.0.1:{port}/hook"))
        .await
        .unwrap_err();
    assert!(!err.is_local());
    match err {
        NotifyError::Delivery {
            status, attempts, ..
        } => {
            assert_eq!(status, None);
            assert_eq!(attempts, 2);
        }
        other => panic!("expected Delivery, got {other:?}"),
    }
}
