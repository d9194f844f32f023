//! Save Queue - non-blocking persistence for game and application state
//!
//! Core modules:
//! - `save`: Task queue, entities, storage targets and execution strategies
//! - `config`: Deployment configuration (save directory, strategy)

pub mod config;
pub mod save;

pub use config::{ExecutionStrategy, SaveConfig};
pub use save::{
    Binary, BinarySave, DedicatedWorker, Executor, FileTarget, JsonSave, MemoryStore,
    MemoryTarget, Save, SaveError, SaveManager, SharedSave, StorageTarget, Task, TaskKind, Text,
    TextSave, ThreadPoolExecutor,
};
