use crate::client::StatementClient;
use crate::config::{ConfigError, EngineConfig};
use crate::error::ExecutionError;
use crate::query::execution::QueryExecution;
use crate::query::pool::AdmissionPool;
use crate::query::tracker::QueryTracker;
use chrono_tz::Tz;
use model::query::{ClientSession, Statement};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

const EXECUTOR_THREAD_NAME: &str = "presto-query-executor";
const DEFAULT_SCHEMA: &str = "default";

/// Entry point for running statements on the remote engine under admission
/// control.
pub struct QueryExecutor {
    config: EngineConfig,
    client: Arc<dyn StatementClient>,
    pool: AdmissionPool,
    shutdown: CancellationToken,
}

impl QueryExecutor {
    /// Fails with `ConfigError::Invalid` for a configuration `validate` rejects.
    pub fn new(config: EngineConfig, client: Arc<dyn StatementClient>) -> Result<Self, ConfigError> {
        config.validate()?;
        let limit = NonZeroUsize::new(config.max_concurrent_queries).ok_or_else(|| {
            ConfigError::Invalid("max_concurrent_queries must be greater than 0".to_owned())
        })?;
        info!(
            address = %config.address,
            max_concurrent_queries = config.max_concurrent_queries,
            "Starting query executor"
        );
        let pool = AdmissionPool::new(
            EXECUTOR_THREAD_NAME,
            limit,
            config.worker_keep_alive(),
        );
        Ok(Self {
            config,
            client,
            pool,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Schedules `sql` and returns its handle right away. Fails without any
    /// network I/O when all executor threads are busy.
    #[instrument(skip(self, session, sql), fields(user = %session.user, schema = %session.schema))]
    pub fn execute(
        &self,
        session: ClientSession,
        sql: impl Into<String>,
    ) -> Result<QueryExecution, ExecutionError> {
        let zone = session_zone(session.time_zone.as_deref())?;
        let execution = QueryExecution::new(Statement::new(session, sql), zone);
        let tracker = QueryTracker::new(
            execution.clone(),
            self.client.clone(),
            self.shutdown.child_token(),
        );

        self.pool
            .submit(Box::new(move || tracker.run()))
            .map_err(|e| {
                warn!(error = %e, "Rejecting query");
                ExecutionError::from(e)
            })?;
        Ok(execution)
    }

    /// Runs `sql` in the default session: configured catalog, `default` schema.
    pub fn execute_raw_query(&self, sql: impl Into<String>) -> Result<QueryExecution, ExecutionError> {
        self.execute(self.default_session(), sql)
    }

    /// Runs `sql` with the project as the default schema.
    pub fn execute_statement(
        &self,
        project: &str,
        sql: impl Into<String>,
    ) -> Result<QueryExecution, ExecutionError> {
        self.execute(self.default_session().with_schema(project), sql)
    }

    pub fn default_session(&self) -> ClientSession {
        let session = ClientSession::new(&self.config.user, &self.config.catalog, DEFAULT_SCHEMA)
            .with_source(&self.config.source);
        match &self.config.time_zone {
            Some(zone) => session.with_time_zone(zone),
            None => session,
        }
    }

    /// Executor threads currently alive.
    pub fn active_workers(&self) -> usize {
        self.pool.live_workers()
    }

    /// Interrupts every running execution. They resolve as EXECUTOR_EXCEPTION
    /// on their next poll.
    pub fn shutdown(&self) {
        info!("Interrupting running queries");
        self.shutdown.cancel();
    }
}

fn session_zone(zone: Option<&str>) -> Result<Tz, ExecutionError> {
    match zone {
        None => Ok(Tz::UTC),
        Some(zone) => zone.parse().map_err(|_| ExecutionError::InvalidTimeZone {
            zone: zone.to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientError, StatementSession};

    struct Offline;

    impl StatementClient for Offline {
        fn open(&self, _: &ClientSession, _: &str) -> Result<Arc<dyn StatementSession>, ClientError> {
            Err(ClientError::Unavailable("offline".to_owned()))
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let zero = EngineConfig {
            max_concurrent_queries: 0,
            ..Default::default()
        };
        assert!(matches!(
            QueryExecutor::new(zero, Arc::new(Offline)),
            Err(ConfigError::Invalid(_))
        ));

        let bad_zone = EngineConfig {
            time_zone: Some("Nowhere/Special".to_owned()),
            ..Default::default()
        };
        assert!(QueryExecutor::new(bad_zone, Arc::new(Offline)).is_err());

        let executor = QueryExecutor::new(EngineConfig::default(), Arc::new(Offline)).unwrap();
        assert_eq!(executor.active_workers(), 0);
    }

    #[test]
    fn session_zone_defaults_to_utc() {
        assert_eq!(session_zone(None).unwrap(), Tz::UTC);
        assert_eq!(
            session_zone(Some("America/Sao_Paulo")).unwrap(),
            chrono_tz::America::Sao_Paulo
        );
        assert!(matches!(
            session_zone(Some("Atlantis/Central")),
            Err(ExecutionError::InvalidTimeZone { .. })
        ));
    }
}
