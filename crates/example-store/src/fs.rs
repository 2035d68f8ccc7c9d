use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::StoreError;
use crate::schema::{is_valid_dataset_name, Example, ExampleId, NewExample};
use crate::storage_traits::{ExampleStore, StoreResult};

/// On-disk document holding one dataset.
#[derive(Debug, Default, Serialize, Deserialize)]
struct DatasetDocument {
    name: String,
    examples: Vec<Example>,
}

/// Filesystem-backed example store, one JSON document per dataset.
///
/// Layout: `<root>/datasets/<dataset>.json`
///
/// Every mutation rewrites the document through a temp file in the same
/// directory followed by a rename, so readers see either the previous or the
/// next document. That makes `replace_examples` a true atomic swap.
pub struct FsExampleStore {
    datasets_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FsExampleStore {
    /// Create a new `FsExampleStore` rooted at `root`. Creates `root/datasets/` if needed.
    pub fn new(root: impl AsRef<Path>) -> StoreResult<Self> {
        let datasets_dir = root.as_ref().join("datasets");
        fs::create_dir_all(&datasets_dir)?;
        Ok(Self {
            datasets_dir,
            write_lock: Mutex::new(()),
        })
    }

    fn document_path(&self, dataset: &str) -> StoreResult<PathBuf> {
        if !is_valid_dataset_name(dataset) {
            return Err(StoreError::InvalidDatasetName {
                name: dataset.to_string(),
            });
        }
        Ok(self.datasets_dir.join(format!("{dataset}.json")))
    }

    fn read_document(&self, dataset: &str) -> StoreResult<DatasetDocument> {
        let path = self.document_path(dataset)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DatasetDocument {
                name: dataset.to_string(),
                examples: Vec::new(),
            }),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn write_document(&self, doc: &DatasetDocument) -> StoreResult<()> {
        let path = self.document_path(&doc.name)?;
        let bytes = serde_json::to_vec_pretty(doc)?;

        let mut tmp = NamedTempFile::new_in(&self.datasets_dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(&path).map_err(|e| e.error)?;
        debug!(dataset = %doc.name, examples = doc.examples.len(), "dataset document written");
        Ok(())
    }
}

#[async_trait]
impl ExampleStore for FsExampleStore {
    async fn list_examples(&self, dataset: &str) -> StoreResult<Vec<Example>> {
        Ok(self.read_document(dataset)?.examples)
    }

    async fn delete_examples(&self, dataset: &str, ids: &[ExampleId]) -> StoreResult<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut doc = self.read_document(dataset)?;
        for id in ids {
            if !doc.examples.iter().any(|e| &e.id == id) {
                return Err(StoreError::ExampleNotFound {
                    dataset: dataset.to_string(),
                    id: id.to_string(),
                });
            }
        }
        doc.examples.retain(|e| !ids.contains(&e.id));
        self.write_document(&doc)
    }

    async fn create_examples(
        &self,
        dataset: &str,
        examples: Vec<NewExample>,
        tag: &str,
    ) -> StoreResult<Vec<Example>> {
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut doc = self.read_document(dataset)?;
        let stored: Vec<Example> = examples
            .into_iter()
            .map(|e| Example::from_new(dataset, tag, e))
            .collect();
        doc.examples.extend(stored.iter().cloned());
        self.write_document(&doc)?;
        Ok(stored)
    }

    fn supports_atomic_replace(&self) -> bool {
        true
    }

    async fn replace_examples(
        &self,
        dataset: &str,
        examples: Vec<NewExample>,
        tag: &str,
    ) -> StoreResult<Vec<Example>> {
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        let stored: Vec<Example> = examples
            .into_iter()
            .map(|e| Example::from_new(dataset, tag, e))
            .collect();
        self.write_document(&DatasetDocument {
            name: dataset.to_string(),
            examples: stored.clone(),
        })?;
        Ok(stored)
    }
}
