//! Agent invocation adapter.
//!
//! The agent runtime is a black box returning raw JSON; [`AgentInvoker`]
//! enforces the timeout and turns the response into a [`Trace`]. There is no
//! retry here: re-invoking an LLM agent has cost and is not deterministic,
//! so that decision belongs to the caller.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use example_store::{Conversation, Role, ToolCall};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::domain::{InvocationError, Trace, TraceEvent};

/// Name of the agent under test, as known to the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentRef(String);

impl AgentRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// External runtime that executes agents.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Run `agent` on `conversation` and return its raw response.
    async fn invoke(
        &self,
        agent: &AgentRef,
        conversation: &Conversation,
    ) -> Result<Value, InvocationError>;
}

/// Runtime reached over HTTP: `POST {agent, messages}` returning
/// `{messages: [...]}`.
pub struct HttpAgentRuntime {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAgentRuntime {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, InvocationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InvocationError::Runtime(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl AgentRuntime for HttpAgentRuntime {
    async fn invoke(
        &self,
        agent: &AgentRef,
        conversation: &Conversation,
    ) -> Result<Value, InvocationError> {
        let body = json!({
            "agent": agent,
            "messages": conversation.messages,
        });
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InvocationError::Runtime(format!("request timed out: {e}"))
                } else {
                    InvocationError::Runtime(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(InvocationError::Runtime(format!(
                "HTTP {}: {}",
                status.as_u16(),
                text
            )));
        }
        response
            .json()
            .await
            .map_err(|e| InvocationError::Malformed(format!("response is not JSON: {e}")))
    }
}

/// Invokes agents with a per-call timeout and records the trace.
#[derive(Clone)]
pub struct AgentInvoker {
    runtime: Arc<dyn AgentRuntime>,
    timeout: Duration,
}

impl AgentInvoker {
    pub fn new(runtime: Arc<dyn AgentRuntime>, timeout: Duration) -> Self {
        Self { runtime, timeout }
    }

    pub async fn invoke(
        &self,
        agent: &AgentRef,
        input: &Conversation,
    ) -> Result<Trace, InvocationError> {
        let raw = tokio::time::timeout(self.timeout, self.runtime.invoke(agent, input))
            .await
            .map_err(|_| InvocationError::Timeout {
                after_ms: self.timeout.as_millis() as u64,
            })??;
        parse_trace(&raw)
    }
}

/// Parse a raw runtime response into a [`Trace`].
///
/// `messages` must be a non-empty array. Each message needs a string `role`;
/// `content` may be null. Tool calls need a `name` (directly or under
/// `function`); arguments may be an object or a JSON-encoded object string.
pub fn parse_trace(raw: &Value) -> Result<Trace, InvocationError> {
    let messages = raw
        .get("messages")
        .and_then(Value::as_array)
        .ok_or_else(|| InvocationError::Malformed("missing `messages` array".into()))?;
    if messages.is_empty() {
        return Err(InvocationError::Malformed("`messages` is empty".into()));
    }

    let events = messages
        .iter()
        .enumerate()
        .map(|(i, m)| parse_event(i, m))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Trace::new(events))
}

fn parse_event(index: usize, message: &Value) -> Result<TraceEvent, InvocationError> {
    let malformed = |what: &str| InvocationError::Malformed(format!("message {index}: {what}"));

    let obj = message.as_object().ok_or_else(|| malformed("not an object"))?;
    let role = obj
        .get("role")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("missing `role`"))?;
    let role = Role::from_str(role).map_err(|e| malformed(&e))?;

    let content = match obj.get("content") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err(malformed("`content` is not a string")),
    };

    let tool_calls = match obj.get("tool_calls") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(calls)) => calls
            .iter()
            .map(|c| parse_tool_call(c).map_err(|e| malformed(&e)))
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(malformed("`tool_calls` is not an array")),
    };

    Ok(TraceEvent {
        role,
        content,
        tool_calls,
    })
}

fn parse_tool_call(call: &Value) -> Result<ToolCall, String> {
    // OpenAI-style calls nest name and arguments under `function`.
    let obj = call
        .get("function")
        .unwrap_or(call)
        .as_object()
        .ok_or("tool call is not an object")?;
    let name = obj
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .ok_or("tool call without `name`")?;

    let arguments = match obj.get("arguments").or_else(|| obj.get("args")) {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(Value::String(s)) if s.trim().is_empty() => Map::new(),
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => map,
            _ => return Err(format!("arguments of `{name}` are not a JSON object")),
        },
        Some(_) => return Err(format!("arguments of `{name}` are not an object")),
    };

    Ok(ToolCall {
        name: name.to_string(),
        arguments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_openai_style_calls() {
        let raw = json!({
            "messages": [
                {"role": "user", "content": "Price of AAPL?"},
                {"role": "assistant", "content": null, "tool_calls": [
                    {"name": "get_stock_price", "args": {"symbol": "AAPL"}},
                    {"id": "c1", "type": "function", "function": {
                        "name": "get_market_sentiment",
                        "arguments": "{\"symbol\": \"AAPL\"}"
                    }}
                ]},
                {"role": "tool", "content": "185.5"},
                {"role": "ai", "content": "AAPL is at $185.50"}
            ]
        });
        let trace = parse_trace(&raw).unwrap();
        assert_eq!(trace.events.len(), 4);
        let names: Vec<_> = trace.tool_calls().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["get_stock_price", "get_market_sentiment"]);
        assert_eq!(trace.tool_calls().nth(1).unwrap().arguments["symbol"], "AAPL");
        assert_eq!(trace.final_response(), "AAPL is at $185.50");
    }

    #[test]
    fn rejects_malformed_responses() {
        let cases = [
            json!({}),
            json!({"messages": []}),
            json!({"messages": [{"content": "no role"}]}),
            json!({"messages": [{"role": "wizard", "content": "x"}]}),
            json!({"messages": [{"role": "assistant", "content": 3}]}),
            json!({"messages": [{"role": "assistant", "tool_calls": [{"args": {}}]}]}),
            json!({"messages": [{"role": "assistant", "tool_calls": [{"name": "x", "arguments": "[1]"}]}]}),
        ];
        for raw in cases {
            assert!(
                matches!(parse_trace(&raw), Err(InvocationError::Malformed(_))),
                "accepted {raw}"
            );
        }
    }

    struct Slow;

    #[async_trait]
    impl AgentRuntime for Slow {
        async fn invoke(&self, _: &AgentRef, _: &Conversation) -> Result<Value, InvocationError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(json!({"messages": [{"role": "assistant", "content": "late"}]}))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn invocation_times_out() {
        let invoker = AgentInvoker::new(Arc::new(Slow), Duration::from_secs(5));
        let err = invoker
            .invoke(&AgentRef::new("slow"), &Conversation::user("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, InvocationError::Timeout { after_ms: 5000 }));
    }
}
