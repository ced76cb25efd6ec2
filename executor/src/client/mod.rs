pub mod http;
pub mod protocol;

use model::query::ClientSession;
use protocol::QueryResults;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use http::HttpStatementClient;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Request to {uri} failed with status {status}: {body}")]
    RequestFailed {
        uri: String,
        status: u16,
        body: String,
    },

    #[error("Malformed response from {uri}: {source}")]
    Decode {
        uri: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Error fetching next batch: no answer within {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Unavailable(String),
}

/// Submits statements to the remote engine. One instance is shared by every
/// running execution.
pub trait StatementClient: Send + Sync {
    fn open(
        &self,
        session: &ClientSession,
        sql: &str,
    ) -> Result<Arc<dyn StatementSession>, ClientError>;
}

/// One in-flight statement on the remote engine.
///
/// Polled by a single tracker thread, while `close` may be called from any
/// other thread at any time.
pub trait StatementSession: Send + Sync {
    /// Neither finished, closed, nor lost.
    fn is_valid(&self) -> bool;
    fn is_closed(&self) -> bool;
    /// The engine lost the statement (restart, repeated transport failures).
    fn is_gone(&self) -> bool;
    /// The current batch carries an engine error.
    fn is_failed(&self) -> bool;
    fn current(&self) -> Arc<QueryResults>;
    /// The last batch, once the session is no longer valid.
    fn final_results(&self) -> Arc<QueryResults>;
    /// Fetches the next batch. `Ok(false)` when there is none.
    fn advance(&self) -> Result<bool, ClientError>;
    /// Idempotent.
    fn close(&self);
}
