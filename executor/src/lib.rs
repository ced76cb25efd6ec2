pub mod client;
pub mod config;
pub mod error;
pub mod query;

#[cfg(feature = "testing")]
pub mod testing;

pub use client::{StatementClient, StatementSession};
pub use config::EngineConfig;
pub use error::ExecutionError;
pub use query::{QueryExecution, QueryExecutor};
