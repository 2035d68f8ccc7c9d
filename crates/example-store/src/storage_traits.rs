//! Storage trait definitions for reference datasets
//!
//! `ExampleStore` is the typed surface over a key-addressed dataset store:
//! list, delete and create examples of a named dataset. Backends that can
//! swap a dataset's contents in one step advertise it through
//! `supports_atomic_replace`.
//!
//! In-memory fakes are provided for testing via the `fakes` module.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::schema::{Example, ExampleId, NewExample};

/// Result type for storage operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Reference dataset store.
///
/// Guarantees:
/// - `list_examples` on an unknown dataset returns an empty list.
/// - `create_examples` stores every example tagged with `tag` and returns
///   the stored records in input order.
/// - Stored examples are immutable; a refresh supersedes them by deletion.
/// - Reads are only assumed eventually consistent unless the backend says
///   otherwise.
#[async_trait]
pub trait ExampleStore: Send + Sync {
    /// List all examples currently stored in `dataset`.
    async fn list_examples(&self, dataset: &str) -> StoreResult<Vec<Example>>;

    /// Delete the given examples from `dataset`.
    async fn delete_examples(&self, dataset: &str, ids: &[ExampleId]) -> StoreResult<()>;

    /// Create `examples` in `dataset`, tagged with `tag`.
    async fn create_examples(
        &self,
        dataset: &str,
        examples: Vec<NewExample>,
        tag: &str,
    ) -> StoreResult<Vec<Example>>;

    /// Whether `replace_examples` swaps the dataset contents in one step.
    fn supports_atomic_replace(&self) -> bool {
        false
    }

    /// Replace the whole contents of `dataset` with `examples` tagged `tag`.
    async fn replace_examples(
        &self,
        _dataset: &str,
        _examples: Vec<NewExample>,
        _tag: &str,
    ) -> StoreResult<Vec<Example>> {
        Err(StoreError::Unsupported {
            op: "replace_examples",
        })
    }
}
