pub mod execution;
pub mod pool;
pub(crate) mod result_cell;
pub mod service;
pub mod stats;
pub mod tracker;
pub mod transcoder;
pub mod type_mapper;

pub use execution::{ExecutionId, QueryExecution};
pub use service::QueryExecutor;
