//! Dataset refresh protocol.
//!
//! `validate -> delete -> create`: the fetch runs first and an empty result
//! aborts before the store is touched, so the only window in which a
//! dataset has no examples is between delete and create. Stores that can
//! swap a dataset atomically skip that window entirely.
//!
//! Refreshes of one dataset are serialized; different datasets refresh
//! independently.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use example_store::{Example, ExampleId, ExampleStore, NewExample};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, instrument};

use crate::domain::{ConfigError, FetchError, RefreshError, SnapshotError};
use crate::metrics::METRICS;
use crate::obs;

/// What a committed refresh did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshOutcome {
    pub dataset: String,
    pub generation_tag: String,
    /// Generation tags present before the refresh.
    pub previous_tags: Vec<String>,
    pub deleted: usize,
    pub created: usize,
    /// Whether the store swapped the dataset in one operation.
    pub atomic: bool,
}

/// Ids are content-derived, so identical examples in one batch would share
/// an id and break one-result-per-example downstream.
fn reject_duplicates(
    dataset: &str,
    generation_tag: &str,
    fresh: &[NewExample],
) -> Result<(), RefreshError> {
    let mut seen = HashSet::with_capacity(fresh.len());
    let mut first = None;
    let mut duplicates = 0;
    for example in fresh {
        let id = ExampleId::derive(dataset, generation_tag, example);
        if seen.contains(&id) {
            duplicates += 1;
            first.get_or_insert_with(|| id.short().to_string());
        } else {
            seen.insert(id);
        }
    }
    match first {
        None => Ok(()),
        Some(first) => Err(RefreshError::DuplicateExamples {
            dataset: dataset.to_string(),
            duplicates,
            first,
        }),
    }
}

/// Owns all dataset mutation.
pub struct RefreshManager {
    store: Arc<dyn ExampleStore>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RefreshManager {
    pub fn new(store: Arc<dyn ExampleStore>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn ExampleStore> {
        &self.store
    }

    async fn dataset_lock(&self, dataset: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(dataset.to_string()).or_default())
    }

    /// Replace the examples of `dataset` with what `fetch` yields, tagged
    /// `generation_tag`.
    ///
    /// `fetch` is called exactly once. Empty fetches, fetches containing
    /// duplicate examples and tag collisions abort before any mutation. A
    /// failed create after a successful delete is reported as
    /// [`RefreshError::CreateAfterDelete`].
    #[instrument(skip_all, fields(dataset = %dataset, tag = %generation_tag))]
    pub async fn refresh<F, Fut>(
        &self,
        dataset: &str,
        fetch: F,
        generation_tag: &str,
    ) -> Result<RefreshOutcome, RefreshError>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Vec<NewExample>, FetchError>> + Send,
    {
        let lock = self.dataset_lock(dataset).await;
        let _guard = lock.lock().await;
        let started = Instant::now();
        obs::emit_refresh_started(dataset, generation_tag);

        // (1) fetch and validate before touching the store
        let fresh = fetch().await.map_err(|source| RefreshError::Fetch {
            dataset: dataset.to_string(),
            source,
        })?;
        if fresh.is_empty() {
            return Err(RefreshError::EmptyFetch {
                dataset: dataset.to_string(),
            });
        }
        reject_duplicates(dataset, generation_tag, &fresh)?;

        let existing = self
            .store
            .list_examples(dataset)
            .await
            .map_err(|source| RefreshError::List {
                dataset: dataset.to_string(),
                source,
            })?;
        let previous_tags: Vec<String> = existing
            .iter()
            .map(|e| e.generation_tag.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if previous_tags.iter().any(|t| t == generation_tag) {
            return Err(RefreshError::TagCollision {
                dataset: dataset.to_string(),
                tag: generation_tag.to_string(),
            });
        }

        let outcome = if self.store.supports_atomic_replace() {
            let created = self
                .store
                .replace_examples(dataset, fresh, generation_tag)
                .await
                .map_err(|source| RefreshError::Replace {
                    dataset: dataset.to_string(),
                    source,
                })?;
            RefreshOutcome {
                dataset: dataset.to_string(),
                generation_tag: generation_tag.to_string(),
                previous_tags,
                deleted: existing.len(),
                created: created.len(),
                atomic: true,
            }
        } else {
            // (2) delete everything currently in the dataset
            let ids: Vec<ExampleId> = existing.iter().map(|e| e.id.clone()).collect();
            if !ids.is_empty() {
                self.store
                    .delete_examples(dataset, &ids)
                    .await
                    .map_err(|source| RefreshError::Delete {
                        dataset: dataset.to_string(),
                        count: ids.len(),
                        source,
                    })?;
            }

            // (3) create the new generation
            let created = match self
                .store
                .create_examples(dataset, fresh, generation_tag)
                .await
            {
                Ok(created) => created,
                Err(source) => {
                    let err = RefreshError::CreateAfterDelete {
                        dataset: dataset.to_string(),
                        deleted: ids.len(),
                        source,
                    };
                    METRICS.inc_critical_refreshes();
                    obs::emit_refresh_critical(dataset, &err);
                    return Err(err);
                }
            };
            RefreshOutcome {
                dataset: dataset.to_string(),
                generation_tag: generation_tag.to_string(),
                previous_tags,
                deleted: ids.len(),
                created: created.len(),
                atomic: false,
            }
        };

        METRICS.inc_datasets_refreshed();
        obs::emit_refresh_finished(&outcome, started.elapsed().as_millis() as u64);
        Ok(outcome)
    }
}

/// Render the generation tag for `date` with a strftime `format`.
pub fn generation_tag(format: &str, date: NaiveDate) -> Result<String, ConfigError> {
    use chrono::format::{Item, StrftimeItems};
    use std::fmt::Write;

    let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
    if items.iter().any(|i| matches!(i, Item::Error)) {
        return Err(ConfigError::Invalid(format!(
            "invalid generation_tag_format {format:?}"
        )));
    }
    let mut tag = String::new();
    write!(tag, "{}", date.format_with_items(items.into_iter()))
        .map_err(|_| ConfigError::Invalid(format!("cannot render {format:?} for {date}")))?;
    Ok(tag)
}

/// Examples a run evaluates, captured once at run start.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub dataset: String,
    pub generation_tag: String,
    pub examples: Vec<Example>,
}

/// Materialize the current generation of `dataset`.
///
/// Empty datasets and datasets mixing generations are rejected; when
/// `expected_tag` is given the dataset must be at that generation.
pub async fn load_snapshot(
    store: &dyn ExampleStore,
    dataset: &str,
    expected_tag: Option<&str>,
) -> Result<Snapshot, SnapshotError> {
    let examples = store
        .list_examples(dataset)
        .await
        .map_err(|source| SnapshotError::Store {
            dataset: dataset.to_string(),
            source,
        })?;
    if examples.is_empty() {
        return Err(SnapshotError::Empty {
            dataset: dataset.to_string(),
        });
    }

    let tags: BTreeSet<&str> = examples.iter().map(|e| e.generation_tag.as_str()).collect();
    if tags.len() > 1 {
        return Err(SnapshotError::MixedGenerations {
            dataset: dataset.to_string(),
            tags: tags.into_iter().map(str::to_string).collect(),
        });
    }
    let generation_tag = examples[0].generation_tag.clone();
    if let Some(expected) = expected_tag {
        if expected != generation_tag {
            return Err(SnapshotError::GenerationMismatch {
                dataset: dataset.to_string(),
                expected: expected.to_string(),
                found: generation_tag,
            });
        }
    }

    info!(dataset = %dataset, tag = %generation_tag, examples = examples.len(), "snapshot loaded");
    Ok(Snapshot {
        dataset: dataset.to_string(),
        generation_tag,
        examples,
    })
}
