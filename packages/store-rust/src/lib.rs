//! `dsorm` Store — entity lifecycle over a pluggable key/value backend.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod memory;
pub mod telemetry;
pub mod traits;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use lifecycle::EntityStore;
pub use memory::MemoryStore;
pub use telemetry::init_tracing;
pub use traits::Store;
