use crate::client::protocol::QueryResults;
use crate::client::{ClientError, StatementClient, StatementSession};
use crate::query::execution::QueryExecution;
use crate::query::transcoder::{RowTranscoder, TranscodeError};
use model::query::result::{EXECUTION_TIME, QUERY};
use model::query::{ExecutionState, QueryError, QueryResult};
use serde_json::Value;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn};

pub const SERVER_NOT_ACTIVE: &str = "Database server is not active.";
pub const ABORTED_BY_USER: &str = "Query aborted by user";
pub const SERVER_GONE: &str = "Query is gone (server restarted?)";
pub const INTERRUPTED: &str = "Query executor thread was interrupted";

/// Whether `error` reports that the statement never reached the engine.
pub fn is_server_inactive(error: &QueryError) -> bool {
    error.message.starts_with(SERVER_NOT_ACTIVE)
}

#[derive(Error, Debug)]
enum TrackerError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Transcode(#[from] TranscodeError),
}

pub fn log_query_error(query: &str, error: &QueryError) {
    warn!(
        sql_state = ?error.sql_state,
        error_code = ?error.error_code,
        query,
        "{}",
        error.message
    );
}

enum Polled {
    /// The last batch consumed inside the loop, if any.
    Done {
        last_batch: Option<Arc<QueryResults>>,
    },
    Interrupted,
}

/// Drives one execution from submission to its terminal result on a pool
/// thread.
pub(crate) struct QueryTracker {
    execution: QueryExecution,
    client: Arc<dyn StatementClient>,
    cancel: CancellationToken,
}

impl QueryTracker {
    pub(crate) fn new(
        execution: QueryExecution,
        client: Arc<dyn StatementClient>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            execution,
            client,
            cancel,
        }
    }

    pub(crate) fn run(self) {
        let span = info_span!("query", id = self.execution.id());
        let _entered = span.enter();
        let query = self.execution.query().to_owned();

        let result = match panic::catch_unwind(AssertUnwindSafe(|| self.track())) {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => unclassified(&query, e.to_string()),
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_owned())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "Query executor thread panicked".to_owned());
                unclassified(&query, message)
            }
        };

        debug!(state = %result.state(), "Execution finished");
        self.execution.resolve(result);
    }

    fn track(&self) -> Result<QueryResult, TrackerError> {
        let statement = self.execution.statement();
        let query = statement.sql.as_str();
        self.execution.transition(ExecutionState::Running);
        let started = Instant::now();

        let session = match self.client.open(&statement.session, query) {
            Ok(session) => session,
            Err(e) => {
                let message = format!("{SERVER_NOT_ACTIVE} {e}");
                warn!(error = %e, "{message}");
                return Ok(QueryResult::error(
                    ExecutionState::Failed,
                    QueryError::new(message),
                    query,
                ));
            }
        };
        info!("Statement submitted");
        self.execution.attach_session(session.clone());

        let mut transcoder = RowTranscoder::new(self.execution.zone());
        let last_batch = match self.wait_for_query(session.as_ref(), &mut transcoder)? {
            Polled::Done { last_batch } => last_batch,
            Polled::Interrupted => {
                return Ok(QueryResult::error(
                    ExecutionState::ExecutorException,
                    QueryError::new(INTERRUPTED),
                    query,
                ));
            }
        };

        if session.is_closed() {
            info!("Aborted by user");
            return Ok(QueryResult::error(
                ExecutionState::Aborted,
                QueryError::new(ABORTED_BY_USER),
                query,
            ));
        }
        if session.is_gone() {
            warn!("Remote engine lost the statement");
            return Ok(QueryResult::error(
                ExecutionState::Gone,
                QueryError::new(SERVER_GONE),
                query,
            ));
        }
        if session.is_failed() {
            let error = session
                .final_results()
                .error
                .as_ref()
                .map(|remote| remote.to_query_error())
                .unwrap_or_else(|| QueryError::new("Query failed"));
            log_query_error(query, &error);
            return Ok(QueryResult::error(ExecutionState::Failed, error, query));
        }

        let final_batch = session.final_results();
        if !last_batch.is_some_and(|last| Arc::ptr_eq(&last, &final_batch)) {
            transcoder.transform_and_add(&final_batch)?;
        }

        let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let (columns, rows) = transcoder.into_parts();
        info!(rows = rows.len(), elapsed_ms = elapsed, "Query succeeded");
        Ok(QueryResult::success(
            columns,
            rows,
            BTreeMap::from([
                (EXECUTION_TIME.to_owned(), Value::from(elapsed)),
                (QUERY.to_owned(), Value::from(query)),
            ]),
        ))
    }

    /// Polls until the session is no longer valid or the execution is killed.
    fn wait_for_query(
        &self,
        session: &dyn StatementSession,
        transcoder: &mut RowTranscoder,
    ) -> Result<Polled, TrackerError> {
        let mut last_batch = None;
        while session.is_valid() {
            if self.cancel.is_cancelled() {
                session.close();
                warn!("{INTERRUPTED}");
                return Ok(Polled::Interrupted);
            }
            if self.execution.kill_requested() {
                session.close();
                break;
            }

            let batch = session.current();
            transcoder.transform_and_add(&batch)?;
            last_batch = Some(batch);

            if let Err(e) = session.advance() {
                if session.is_gone() || session.is_closed() {
                    debug!(error = %e, "Advance failed on a finished session");
                    break;
                }
                return Err(e.into());
            }
        }
        Ok(Polled::Done { last_batch })
    }
}

fn unclassified(query: &str, message: String) -> QueryResult {
    let error = QueryError::new(message);
    log_query_error(query, &error);
    QueryResult::error(ExecutionState::ExecutorException, error, query)
}
