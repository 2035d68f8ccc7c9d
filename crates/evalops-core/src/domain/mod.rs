//! Domain models for evalops.
//!
//! - `Trace`: what an agent did for one input
//! - `EvaluationResult`: one score per (example, metric)
//! - error taxonomy shared by the pipeline stages

pub mod error;
pub mod result;
pub mod trace;

pub use error::{
    ConfigError, FetchError, InvocationError, JudgeError, RefreshError, SnapshotError,
};
pub use result::{EvaluationResult, FailureKind};
pub use trace::{Trace, TraceEvent};
