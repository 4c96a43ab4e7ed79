//! Core event-ingestion and state engine shared by the recorder, the
//! RPC server, the hook ingestor and the operator CLI.

pub mod error;
pub mod hashing;
pub mod integration;
pub mod process;
pub mod recorder;
pub mod registry;
pub mod store;
pub mod types;

pub use error::{CoreError, Result};
pub use registry::Registry;
pub use store::ProjectStore;
