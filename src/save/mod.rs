//! Asynchronous save/load system
//!
//! This module persists application state without blocking the controlling
//! (game/UI) thread:
//! - An ordered task queue with at most one task in flight
//! - Entities serialized on the controlling thread, I/O done on a worker
//! - Pluggable storage targets (files, in-memory/platform stores)
//! - Two execution strategies: rayon thread pool or a dedicated worker thread
//! - Composite entities assembled from binary or `name: value` text fields
//!
//! # Architecture
//!
//! - `types`: Task data structures and error types
//! - `saveable`: Save traits and binary/text readers and writers
//! - `fields`: Composite entities built from field descriptors
//! - `json`: Serde-backed entity with a versioned envelope
//! - `target`: Storage targets
//! - `executor`: Execution strategies
//! - `manager`: SaveManager, the task queue
//!
//! # Example Usage
//!
//! ```ignore
//! let mut manager = SaveManager::with_dedicated_worker()?;
//! manager.on_task_finished(|task| {
//!     if !task.succeeded() {
//!         log::warn!("{} failed: {:?}", task.kind, task.failure);
//!     }
//! });
//!
//! let target = Arc::new(FileTarget::new(save_dir, "slot_1.bin")?);
//! manager.enqueue_load(game_save.clone(), target.clone());
//!
//! // every frame
//! manager.update();
//!
//! // before exit
//! manager.shutdown();
//! ```

pub mod executor;
pub mod fields;
pub mod json;
pub mod manager;
pub mod saveable;
pub mod target;
pub mod types;

// Re-export commonly used types
pub use executor::{DedicatedWorker, Executor, ThreadPoolExecutor};
pub use fields::{BinaryField, BinarySaveCollection, TextField, TextSavable, TextSaveCollection};
pub use json::JsonSave;
pub use manager::SaveManager;
pub use saveable::{
    Binary, BinarySave, ByteReader, ByteWriter, LineWriter, Save, Text, TextSave,
    parse_text_fields,
};
pub use target::{FileTarget, MemoryStore, MemoryTarget, StorageTarget};
pub use types::*;
