use crate::client::StatementSession;
use crate::query::result_cell::ResultCell;
use crate::query::stats;
use chrono_tz::Tz;
use model::query::{ExecutionState, QueryResult, QueryStats, Statement};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, RwLock};
use tracing::{info, warn};

pub type ExecutionId = u64;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

struct Shared {
    id: ExecutionId,
    statement: Statement,
    zone: Tz,
    state: RwLock<ExecutionState>,
    session: OnceLock<Arc<dyn StatementSession>>,
    kill_requested: AtomicBool,
    result: ResultCell,
}

/// Caller-side handle of one statement execution. Cheap to clone; all clones
/// observe the same execution.
#[derive(Clone)]
pub struct QueryExecution {
    shared: Arc<Shared>,
}

impl QueryExecution {
    pub(crate) fn new(statement: Statement, zone: Tz) -> Self {
        Self::with_cell(statement, zone, ExecutionState::Unstarted, ResultCell::new())
    }

    /// A handle that is already finished with `result`.
    pub fn completed(query: impl Into<String>, result: QueryResult) -> Self {
        let statement = Statement {
            session: Default::default(),
            sql: query.into(),
        };
        let state = result.state();
        Self::with_cell(statement, Tz::UTC, state, ResultCell::resolved(result))
    }

    fn with_cell(statement: Statement, zone: Tz, state: ExecutionState, result: ResultCell) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                statement,
                zone,
                state: RwLock::new(state),
                session: OnceLock::new(),
                kill_requested: AtomicBool::new(false),
                result,
            }),
        }
    }

    pub fn id(&self) -> ExecutionId {
        self.shared.id
    }

    pub fn query(&self) -> &str {
        &self.shared.statement.sql
    }

    pub fn statement(&self) -> &Statement {
        &self.shared.statement
    }

    pub fn zone(&self) -> Tz {
        self.shared.zone
    }

    pub fn state(&self) -> ExecutionState {
        *self
            .shared
            .state
            .read()
            .expect("No one should panic while holding this lock")
    }

    /// Latest known progress. Never blocks on the remote engine.
    pub fn current_stats(&self) -> QueryStats {
        let Some(session) = self.shared.session.get() else {
            return QueryStats::waiting();
        };
        if session.is_failed() {
            return QueryStats::failed();
        }
        let batch = if session.is_valid() {
            session.current()
        } else {
            session.final_results()
        };
        stats::from_remote(&batch.stats)
    }

    pub fn is_finished(&self) -> bool {
        self.shared.result.is_set()
    }

    /// Waits for the terminal result. Every caller gets the same result.
    pub async fn result(&self) -> Arc<QueryResult> {
        self.shared.result.wait().await
    }

    pub fn try_result(&self) -> Option<Arc<QueryResult>> {
        self.shared.result.get()
    }

    /// Requests the statement to be aborted. Returns immediately; the result
    /// resolves as ABORTED once the tracker notices the closed session.
    pub fn kill(&self) {
        info!(id = self.shared.id, "Kill requested");
        self.shared.kill_requested.store(true, Ordering::SeqCst);
        if let Some(session) = self.shared.session.get() {
            session.close();
        }
    }

    pub(crate) fn kill_requested(&self) -> bool {
        self.shared.kill_requested.load(Ordering::SeqCst)
    }

    pub(crate) fn attach_session(&self, session: Arc<dyn StatementSession>) {
        if self.shared.session.set(session).is_err() {
            unreachable!("A session is attached only once per execution");
        }
        // Pairs with `kill`; the tracker also re-checks the flag on every poll
        if self.shared.kill_requested.load(Ordering::SeqCst) {
            if let Some(session) = self.shared.session.get() {
                session.close();
            }
        }
    }

    pub(crate) fn transition(&self, next: ExecutionState) -> bool {
        let mut state = self
            .shared
            .state
            .write()
            .expect("No one should panic while holding this lock");
        if !state.can_transition_to(next) {
            let current = *state;
            warn!(id = self.shared.id, from = %current, to = %next, "Ignoring invalid state transition");
            return false;
        }
        *state = next;
        true
    }

    pub(crate) fn resolve(&self, result: QueryResult) {
        self.transition(result.state());
        if !self.shared.result.complete(result) {
            warn!(id = self.shared.id, "Execution already resolved");
        }
    }
}

impl std::fmt::Debug for QueryExecution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExecution")
            .field("id", &self.shared.id)
            .field("query", &self.shared.statement.sql)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::query::{ClientSession, QueryError, StatsState};
    use std::collections::BTreeMap;

    fn execution() -> QueryExecution {
        QueryExecution::new(
            Statement::new(ClientSession::new("alice", "hive", "default"), "select 1"),
            Tz::UTC,
        )
    }

    #[test]
    fn unstarted_execution_is_waiting() {
        let execution = execution();
        assert_eq!(execution.state(), ExecutionState::Unstarted);
        assert_eq!(execution.current_stats().state, StatsState::WaitingForAvailableThread);
        assert!(!execution.is_finished());
        // Nothing attached yet, the kill is remembered
        execution.kill();
        assert!(execution.try_result().is_none());
    }

    #[test]
    fn invalid_transitions_are_ignored() {
        let execution = execution();
        assert!(!execution.transition(ExecutionState::Succeeded));
        assert_eq!(execution.state(), ExecutionState::Unstarted);
        assert!(execution.transition(ExecutionState::Running));
        assert!(execution.transition(ExecutionState::Succeeded));
        assert!(!execution.transition(ExecutionState::Failed));
        assert_eq!(execution.state(), ExecutionState::Succeeded);
    }

    #[test]
    fn resolve_is_single_assignment() {
        let execution = execution();
        execution.transition(ExecutionState::Running);
        execution.resolve(QueryResult::success(vec![], vec![], BTreeMap::new()));
        execution.resolve(QueryResult::error(
            ExecutionState::Failed,
            QueryError::new("late"),
            "select 1",
        ));

        assert!(execution.is_finished());
        assert_eq!(execution.state(), ExecutionState::Succeeded);
        assert!(!execution.try_result().unwrap().is_failed());
    }

    #[tokio::test]
    async fn completed_handle_is_finished() {
        let result = QueryResult::error(
            ExecutionState::Failed,
            QueryError::new("Table already exists"),
            "drop table x",
        );
        let execution = QueryExecution::completed("drop table x", result);
        assert!(execution.is_finished());
        assert_eq!(execution.state(), ExecutionState::Failed);
        assert_eq!(execution.query(), "drop table x");
        assert_eq!(
            execution.result().await.error_details().map(|e| e.message.as_str()),
            Some("Table already exists")
        );
    }

    #[test]
    fn clones_share_state() {
        let execution = execution();
        let clone = execution.clone();
        assert_eq!(clone.id(), execution.id());
        execution.transition(ExecutionState::Running);
        assert_eq!(clone.state(), ExecutionState::Running);
    }
}
