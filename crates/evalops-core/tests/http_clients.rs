//! HTTP adapters against a mock server: judge model, agent runtime and
//! remote example sources.

use std::time::Duration;

use chrono::NaiveDate;
use evalops_core::{
    AgentInvoker, AgentRef, ExampleSource, FetchError, HttpAgentRuntime, HttpExampleSource,
    InvocationError, JudgeError, JudgeModel, JudgePrompt, OpenAiCompatJudge,
};
use example_store::Conversation;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn prompt() -> JudgePrompt {
    JudgePrompt {
        system: "You are an impartial evaluator.".into(),
        user: "Question:\nPrice of AAPL?\n".into(),
    }
}

// ---- judge ----

#[tokio::test]
async fn judge_reads_first_choice_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({"model": "gpt-4o-mini", "temperature": 0.0})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "True"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let judge = OpenAiCompatJudge::new(
        format!("{}/v1/chat/completions", server.uri()),
        "gpt-4o-mini",
        Some("sk-test".into()),
        0.0,
        Duration::from_secs(5),
    )
    .unwrap();

    assert_eq!(judge.complete(&prompt()).await.unwrap(), "True");
}

#[tokio::test]
async fn judge_http_error_is_a_request_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let judge =
        OpenAiCompatJudge::new(server.uri(), "gpt-4o-mini", None, 0.0, Duration::from_secs(5))
            .unwrap();
    let err = judge.complete(&prompt()).await.unwrap_err();
    assert!(matches!(err, JudgeError::Request(ref m) if m.contains("429")));
}

#[tokio::test]
async fn judge_response_without_choices_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let judge =
        OpenAiCompatJudge::new(server.uri(), "gpt-4o-mini", None, 0.0, Duration::from_secs(5))
            .unwrap();
    assert!(matches!(
        judge.complete(&prompt()).await,
        Err(JudgeError::Request(_))
    ));
}

// ---- agent runtime ----

#[tokio::test]
async fn runtime_response_becomes_trace() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/invoke"))
        .and(body_partial_json(json!({"agent": "market-agent"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [
                {"role": "assistant", "tool_calls": [
                    {"name": "get_stock_price", "arguments": {"symbol": "AAPL"}}
                ]},
                {"role": "tool", "content": "185.50"},
                {"role": "assistant", "content": "AAPL is at $185.50"}
            ]
        })))
        .mount(&server)
        .await;

    let runtime =
        HttpAgentRuntime::new(format!("{}/invoke", server.uri()), Duration::from_secs(5)).unwrap();
    let invoker = AgentInvoker::new(Arc::new(runtime), Duration::from_secs(5));
    let trace = invoker
        .invoke(&AgentRef::new("market-agent"), &Conversation::user("Price of AAPL?"))
        .await
        .unwrap();

    assert_eq!(trace.final_response(), "AAPL is at $185.50");
    assert!(trace.tool_names().contains("get_stock_price"));
}

#[tokio::test]
async fn runtime_server_error_is_runtime_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("agent crashed"))
        .mount(&server)
        .await;

    let runtime = HttpAgentRuntime::new(server.uri(), Duration::from_secs(5)).unwrap();
    let invoker = AgentInvoker::new(Arc::new(runtime), Duration::from_secs(5));
    let err = invoker
        .invoke(&AgentRef::new("market-agent"), &Conversation::user("hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, InvocationError::Runtime(ref m) if m.contains("500")));
}

#[tokio::test]
async fn runtime_response_without_messages_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"output": "hi"})))
        .mount(&server)
        .await;

    let runtime = HttpAgentRuntime::new(server.uri(), Duration::from_secs(5)).unwrap();
    let invoker = AgentInvoker::new(Arc::new(runtime), Duration::from_secs(5));
    let err = invoker
        .invoke(&AgentRef::new("market-agent"), &Conversation::user("hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, InvocationError::Malformed(_)));
}

// ---- example source ----

#[tokio::test]
async fn http_source_substitutes_date() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/datasets/market.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "question": "Close of AAPL on {today}?",
                "response": "AAPL closed at $185.50",
                "expected_tools": [{"name": "get_stock_price", "args": {"symbol": "AAPL", "date": "{today}"}}]
            }
        ])))
        .mount(&server)
        .await;

    let source = HttpExampleSource::new(
        format!("{}/datasets/market.json", server.uri()),
        Duration::from_secs(5),
    )
    .unwrap();
    let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
    let examples = source.fetch(date).await.unwrap();

    assert_eq!(examples.len(), 1);
    assert_eq!(
        examples[0].input.last_user_message(),
        Some("Close of AAPL on 2026-03-14?")
    );
    assert_eq!(examples[0].reference.tool_calls[0].arguments["date"], "2026-03-14");
}

#[tokio::test]
async fn http_source_status_error_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let source = HttpExampleSource::new(server.uri(), Duration::from_secs(5)).unwrap();
    let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
    let err = source.fetch(date).await.unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 503, .. }));
}

#[tokio::test]
async fn http_source_garbage_is_a_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let source = HttpExampleSource::new(server.uri(), Duration::from_secs(5)).unwrap();
    let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
    assert!(matches!(
        source.fetch(date).await,
        Err(FetchError::Parse { .. })
    ));
}
