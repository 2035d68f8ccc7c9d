//! example-store: reference dataset persistence for evalops
//!
//! This crate is the typed client over the dataset store that holds the
//! reference examples agents are evaluated against.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: immutable examples, generation tags, and a store surface small
//! enough (list / delete / create) to sit in front of any hosted backend.
//!
//! ## Key Components
//!
//! - `ExampleStore`: async storage trait
//! - `FsExampleStore`: filesystem backend with atomic document swaps
//! - `fakes::MemoryExampleStore`: in-memory fake with failure injection

mod error;
pub mod fakes;
mod fs;
pub mod schema;
pub mod storage_traits;

pub use error::StoreError;
pub use fs::FsExampleStore;
pub use schema::{
    is_valid_dataset_name, ChatMessage, Conversation, Example, ExampleId, NewExample,
    ReferenceTrace, Role, ToolCall,
};
pub use storage_traits::{ExampleStore, StoreResult};
