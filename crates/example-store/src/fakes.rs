//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryExampleStore`, which satisfies the `ExampleStore` contract
//! without external dependencies and can be told to fail deletes or creates.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::schema::{is_valid_dataset_name, Example, ExampleId, NewExample};
use crate::storage_traits::*;

/// A mutation observed by the fake, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Delete { dataset: String, count: usize },
    Create { dataset: String, count: usize },
    Replace { dataset: String, count: usize },
}

/// In-memory example store backed by a `HashMap<dataset, Vec<Example>>`.
#[derive(Debug, Default)]
pub struct MemoryExampleStore {
    datasets: Mutex<HashMap<String, Vec<Example>>>,
    ops: Mutex<Vec<StoreOp>>,
    fail_deletes: AtomicBool,
    fail_creates: AtomicBool,
    atomic_replace: bool,
}

impl MemoryExampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fake that advertises (and implements) atomic replace.
    pub fn with_atomic_replace() -> Self {
        Self {
            atomic_replace: true,
            ..Self::default()
        }
    }

    /// Make every subsequent delete fail.
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent create (and replace) fail.
    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    /// Seed a dataset directly, bypassing the op log.
    pub fn seed(&self, dataset: &str, examples: Vec<NewExample>, tag: &str) {
        let stored = examples
            .into_iter()
            .map(|e| Example::from_new(dataset, tag, e))
            .collect();
        self.datasets
            .lock()
            .unwrap()
            .insert(dataset.to_string(), stored);
    }

    /// Mutations performed so far.
    pub fn operations(&self) -> Vec<StoreOp> {
        self.ops.lock().unwrap().clone()
    }

    fn check_name(dataset: &str) -> StoreResult<()> {
        if is_valid_dataset_name(dataset) {
            Ok(())
        } else {
            Err(StoreError::InvalidDatasetName {
                name: dataset.to_string(),
            })
        }
    }
}

#[async_trait]
impl ExampleStore for MemoryExampleStore {
    async fn list_examples(&self, dataset: &str) -> StoreResult<Vec<Example>> {
        Self::check_name(dataset)?;
        let datasets = self.datasets.lock().unwrap();
        Ok(datasets.get(dataset).cloned().unwrap_or_default())
    }

    async fn delete_examples(&self, dataset: &str, ids: &[ExampleId]) -> StoreResult<()> {
        Self::check_name(dataset)?;
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Injected { op: "delete" });
        }
        let mut datasets = self.datasets.lock().unwrap();
        let examples = datasets.entry(dataset.to_string()).or_default();
        for id in ids {
            if !examples.iter().any(|e| &e.id == id) {
                return Err(StoreError::ExampleNotFound {
                    dataset: dataset.to_string(),
                    id: id.to_string(),
                });
            }
        }
        examples.retain(|e| !ids.contains(&e.id));
        self.ops.lock().unwrap().push(StoreOp::Delete {
            dataset: dataset.to_string(),
            count: ids.len(),
        });
        Ok(())
    }

    async fn create_examples(
        &self,
        dataset: &str,
        examples: Vec<NewExample>,
        tag: &str,
    ) -> StoreResult<Vec<Example>> {
        Self::check_name(dataset)?;
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(StoreError::Injected { op: "create" });
        }
        let stored: Vec<Example> = examples
            .into_iter()
            .map(|e| Example::from_new(dataset, tag, e))
            .collect();
        let mut datasets = self.datasets.lock().unwrap();
        datasets
            .entry(dataset.to_string())
            .or_default()
            .extend(stored.iter().cloned());
        self.ops.lock().unwrap().push(StoreOp::Create {
            dataset: dataset.to_string(),
            count: stored.len(),
        });
        Ok(stored)
    }

    fn supports_atomic_replace(&self) -> bool {
        self.atomic_replace
    }

    async fn replace_examples(
        &self,
        dataset: &str,
        examples: Vec<NewExample>,
        tag: &str,
    ) -> StoreResult<Vec<Example>> {
        if !self.atomic_replace {
            return Err(StoreError::Unsupported {
                op: "replace_examples",
            });
        }
        Self::check_name(dataset)?;
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(StoreError::Injected { op: "replace" });
        }
        let stored: Vec<Example> = examples
            .into_iter()
            .map(|e| Example::from_new(dataset, tag, e))
            .collect();
        self.datasets
            .lock()
            .unwrap()
            .insert(dataset.to_string(), stored.clone());
        self.ops.lock().unwrap().push(StoreOp::Replace {
            dataset: dataset.to_string(),
            count: stored.len(),
        });
        Ok(stored)
    }
}
