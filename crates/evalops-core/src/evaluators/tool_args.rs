//! Structural tool-argument match.
//!
//! Each reference invocation is matched against the first unconsumed actual
//! invocation of the same tool whose argument mapping is equal under
//! [`values_equal`](super::value_eq::values_equal). Score is the fraction of
//! reference invocations matched.

use example_store::{ReferenceTrace, ToolCall};

use super::value_eq::{first_mismatch, DEFAULT_TOLERANCE};
use super::Score;
use crate::domain::Trace;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToolArgsMatch {
    pub tolerance: f64,
}

impl Default for ToolArgsMatch {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl ToolArgsMatch {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    pub fn score(&self, actual: &Trace, reference: &ReferenceTrace) -> Score {
        if reference.tool_calls.is_empty() {
            return Score {
                value: 1.0,
                reason: "no expected tools".to_string(),
            };
        }

        let actual: Vec<&ToolCall> = actual.tool_calls().collect();
        let mut consumed = vec![false; actual.len()];
        let mut matched = 0usize;
        let mut problems: Vec<String> = Vec::new();

        for expected in &reference.tool_calls {
            let hit = actual.iter().enumerate().position(|(i, call)| {
                !consumed[i]
                    && call.name == expected.name
                    && first_mismatch(&expected.arguments, &call.arguments, self.tolerance)
                        .is_none()
            });
            if let Some(i) = hit {
                consumed[i] = true;
                matched += 1;
                continue;
            }

            // Diagnose against the first unconsumed call of the same name.
            let candidate = actual
                .iter()
                .enumerate()
                .find(|(i, call)| !consumed[*i] && call.name == expected.name);
            let problem = match candidate {
                Some((_, call)) => {
                    match first_mismatch(&expected.arguments, &call.arguments, self.tolerance) {
                        Some(mismatch) => format!("{}: {}", expected.name, mismatch),
                        None => format!("{}: arguments differ", expected.name),
                    }
                }
                None => format!("{}: not invoked", expected.name),
            };
            problems.push(problem);
        }

        let total = reference.tool_calls.len();
        let mut reason = format!("{matched}/{total} tools match");
        if !problems.is_empty() {
            reason.push_str("; ");
            reason.push_str(&problems.join("; "));
        }
        Score {
            value: matched as f64 / total as f64,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TraceEvent;
    use example_store::Role;
    use serde_json::json;

    fn trace(calls: Vec<ToolCall>) -> Trace {
        let mut event = TraceEvent::new(Role::Assistant, "");
        for call in calls {
            event = event.with_tool_call(call);
        }
        Trace::new(vec![event])
    }

    fn reference(calls: Vec<ToolCall>) -> ReferenceTrace {
        ReferenceTrace {
            tool_calls: calls,
            expected_response: String::new(),
        }
    }

    #[test]
    fn empty_reference_scores_one() {
        let s = ToolArgsMatch::default().score(
            &trace(vec![ToolCall::new("x", json!({}))]),
            &reference(vec![]),
        );
        assert_eq!(s.value, 1.0);
        assert_eq!(s.reason, "no expected tools");
    }

    #[test]
    fn exact_arguments_match() {
        let call = ToolCall::new("get_stock_price", json!({"symbol": "AAPL"}));
        let s = ToolArgsMatch::default().score(&trace(vec![call.clone()]), &reference(vec![call]));
        assert_eq!(s.value, 1.0);
        assert_eq!(s.reason, "1/1 tools match");
    }

    #[test]
    fn never_invoked_tool_contributes_zero() {
        let s = ToolArgsMatch::default().score(
            &trace(vec![ToolCall::new("get_stock_price", json!({"symbol": "AAPL"}))]),
            &reference(vec![
                ToolCall::new("get_stock_price", json!({"symbol": "AAPL"})),
                ToolCall::new("get_market_sentiment", json!({"symbol": "AAPL"})),
            ]),
        );
        assert_eq!(s.value, 0.5);
        assert!(s.reason.contains("get_market_sentiment: not invoked"));
    }

    #[test]
    fn repeated_calls_are_consumed_once() {
        let aapl = ToolCall::new("get_stock_price", json!({"symbol": "AAPL"}));
        let msft = ToolCall::new("get_stock_price", json!({"symbol": "MSFT"}));

        // One actual call cannot satisfy two reference calls.
        let s = ToolArgsMatch::default().score(
            &trace(vec![aapl.clone()]),
            &reference(vec![aapl.clone(), aapl.clone()]),
        );
        assert_eq!(s.value, 0.5);

        // Order of actual calls does not matter.
        let s = ToolArgsMatch::default().score(
            &trace(vec![msft.clone(), aapl.clone()]),
            &reference(vec![aapl, msft]),
        );
        assert_eq!(s.value, 1.0);
    }

    #[test]
    fn reason_names_first_mismatching_key() {
        let s = ToolArgsMatch::default().score(
            &trace(vec![ToolCall::new(
                "calculate_moving_average",
                json!({"symbol": "AAPL", "window": 20}),
            )]),
            &reference(vec![ToolCall::new(
                "calculate_moving_average",
                json!({"symbol": "AAPL", "window": 50}),
            )]),
        );
        assert_eq!(s.value, 0.0);
        assert!(s.reason.contains("calculate_moving_average: `window` expected 50, got 20"));
    }
}
