//! Per-metric pass criteria.
//!
//! A threshold is configured either as a bare number, meaning the mean must
//! be at least that value, or as a comparison expression such as `">=0.8"`
//! or `">3.5"`.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::domain::ConfigError;

/// Slack applied to inclusive and equality comparisons so that a mean
/// computed as 0.7999999999 still meets a 0.8 threshold.
const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
        }
    }

    /// True for `>` and `>=`, where a zero score can never meet the bound.
    /// Under any other comparison a failed result scored as zero would look
    /// like a good score.
    pub fn rewards_high_scores(&self) -> bool {
        matches!(self, CompareOp::Gt | CompareOp::Ge)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    pub op: CompareOp,
    pub value: f64,
}

impl Threshold {
    /// `score >= value`.
    pub fn at_least(value: f64) -> Self {
        Self {
            op: CompareOp::Ge,
            value,
        }
    }

    /// Parse `">=0.8"`, `"< 2"`, `"0.75"` and friends.
    pub fn parse(expr: &str) -> Result<Self, ConfigError> {
        let trimmed = expr.trim();
        // Two-character operators first so ">=" is not read as ">".
        let ops = [
            (">=", CompareOp::Ge),
            ("<=", CompareOp::Le),
            ("==", CompareOp::Eq),
            ("!=", CompareOp::Ne),
            (">", CompareOp::Gt),
            ("<", CompareOp::Lt),
        ];
        let (op, rest) = ops
            .iter()
            .find_map(|(prefix, op)| trimmed.strip_prefix(prefix).map(|rest| (*op, rest)))
            .unwrap_or((CompareOp::Ge, trimmed));

        let value: f64 = rest
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidThreshold(expr.to_string()))?;
        if !value.is_finite() {
            return Err(ConfigError::InvalidThreshold(expr.to_string()));
        }
        Ok(Self { op, value })
    }

    /// Whether `score` satisfies this threshold.
    pub fn is_met(&self, score: f64) -> bool {
        match self.op {
            CompareOp::Gt => score > self.value,
            CompareOp::Ge => score >= self.value - EPSILON,
            CompareOp::Lt => score < self.value,
            CompareOp::Le => score <= self.value + EPSILON,
            CompareOp::Eq => (score - self.value).abs() <= EPSILON,
            CompareOp::Ne => (score - self.value).abs() > EPSILON,
        }
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:.2}", self.op.as_str(), self.value)
    }
}

impl std::str::FromStr for Threshold {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Threshold::parse(s)
    }
}

impl Serialize for Threshold {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{}{}", self.op.as_str(), self.value))
    }
}

impl<'de> Deserialize<'de> for Threshold {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(f64),
            Expr(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(value) => Ok(Threshold::at_least(value)),
            Repr::Expr(expr) => Threshold::parse(&expr).map_err(serde::de::Error::custom),
        }
    }
}

/// Threshold for one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricThreshold {
    pub metric: String,
    pub threshold: Threshold,
}

/// Metric thresholds in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Thresholds(Vec<MetricThreshold>);

impl Thresholds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or overwrite `metric`, keeping its original position.
    pub fn insert(&mut self, metric: impl Into<String>, threshold: Threshold) {
        let metric = metric.into();
        match self.0.iter_mut().find(|m| m.metric == metric) {
            Some(existing) => existing.threshold = threshold,
            None => self.0.push(MetricThreshold { metric, threshold }),
        }
    }

    pub fn with(mut self, metric: impl Into<String>, threshold: Threshold) -> Self {
        self.insert(metric, threshold);
        self
    }

    pub fn get(&self, metric: &str) -> Option<&Threshold> {
        self.0
            .iter()
            .find(|m| m.metric == metric)
            .map(|m| &m.threshold)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricThreshold> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
