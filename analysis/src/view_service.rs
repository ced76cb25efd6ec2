use catalog::view_catalog::{ViewCatalog, ViewCatalogError};
use chrono::{DateTime, Utc};
use executor::{ExecutionError, QueryExecution, QueryExecutor};
use model::query::QueryError;
use model::view::{self, CreateMaterializedView};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Source of `last_update` timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Error, Debug)]
pub enum ViewError {
    #[error("Couldn't create table: {0}")]
    CreateTable(QueryError),
    #[error("Materialized view '{project}.{name}' does not exist")]
    NotFound { project: String, name: String },
    #[error(transparent)]
    Catalog(#[from] ViewCatalogError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl ViewError {
    pub fn status_code(&self) -> u16 {
        match self {
            ViewError::CreateTable(_) => 400,
            ViewError::NotFound { .. } => 404,
            ViewError::Catalog(_) => 500,
            ViewError::Execution(e) => e.status_code(),
        }
    }
}

fn create_table_sql(table: &str, query: &str) -> String {
    format!("CREATE TABLE materialized.{table} AS ({query})")
}

fn drop_table_sql(table: &str) -> String {
    format!("DROP TABLE materialized.{table}")
}

/// Materialized views: a catalog record plus a backing table on the engine,
/// kept in the `materialized` schema of the project.
pub struct MaterializedViewService {
    executor: Arc<QueryExecutor>,
    catalog: Arc<ViewCatalog>,
    clock: Arc<dyn Clock>,
}

impl MaterializedViewService {
    pub fn new(executor: Arc<QueryExecutor>, catalog: Arc<ViewCatalog>, clock: Arc<dyn Clock>) -> Self {
        Self {
            executor,
            catalog,
            clock,
        }
    }

    /// Creates the empty backing table, then records the view. Nothing is
    /// recorded when the engine rejects the table.
    #[instrument(skip_all, fields(project = %req.project, view = %req.name))]
    pub async fn create(&self, req: CreateMaterializedView) -> Result<view::Model, ViewError> {
        let sql = create_table_sql(&req.table_name, &format!("{} LIMIT 0", req.query));
        let result = self.executor.execute_statement(&req.project, sql)?.result().await;
        if let Some(error) = result.error_details() {
            warn!(error = %error, "Backing table was not created");
            return Err(ViewError::CreateTable(error.clone()));
        }

        let view = self.catalog.save_materialized_view(req).await?;
        info!(table = %view.table_name, "Materialized view created");
        Ok(view)
    }

    /// Removes the record and drops the backing table. The returned handle
    /// tracks the drop.
    #[instrument(skip(self))]
    pub async fn delete(&self, project: &str, name: &str) -> Result<QueryExecution, ViewError> {
        let view = self
            .catalog
            .delete_materialized_view(project, name)
            .await?
            .ok_or_else(|| ViewError::NotFound {
                project: project.to_owned(),
                name: name.to_owned(),
            })?;

        info!(table = %view.table_name, "Dropping materialized view");
        Ok(self
            .executor
            .execute_statement(project, drop_table_sql(&view.table_name))?)
    }

    pub async fn list(&self, project: &str) -> Result<Vec<view::Model>, ViewError> {
        Ok(self.catalog.get_materialized_views(project).await?)
    }

    pub async fn get(&self, project: &str, name: &str) -> Result<view::Model, ViewError> {
        self.catalog
            .get_materialized_view(project, name)
            .await?
            .ok_or_else(|| ViewError::NotFound {
                project: project.to_owned(),
                name: name.to_owned(),
            })
    }

    /// Rebuilds the backing table from the view query. A previously built
    /// table is dropped first; if that fails, the returned handle is already
    /// finished with the failed drop. `last_update` is recorded once the
    /// rebuild succeeds.
    #[instrument(skip_all, fields(project = %view.project, view = %view.name))]
    pub async fn update(&self, view: &view::Model) -> Result<QueryExecution, ViewError> {
        if view.last_update.is_some() {
            let sql = drop_table_sql(&view.table_name);
            let dropped = self.executor.execute_statement(&view.project, sql.clone())?.result().await;
            if dropped.is_failed() {
                warn!("Dropping the previous table failed, skipping the rebuild");
                return Ok(QueryExecution::completed(sql, Arc::unwrap_or_clone(dropped)));
            }
        }

        let execution = self
            .executor
            .execute_statement(&view.project, create_table_sql(&view.table_name, &view.query))?;

        let pending = execution.clone();
        let catalog = self.catalog.clone();
        let clock = self.clock.clone();
        let (project, name) = (view.project.clone(), view.name.clone());
        tokio::spawn(async move {
            let result = pending.result().await;
            if result.is_failed() {
                debug!(project = %project, name = %name, "Rebuild failed, keeping the previous update time");
                return;
            }
            if let Err(e) = catalog.update_materialized_view(&project, &name, clock.now()).await {
                warn!(project = %project, name = %name, error = %e, "Failed to record materialized view update");
            }
        });

        Ok(execution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backing_table_statements() {
        assert_eq!(
            create_table_sql("daily", "select 1 LIMIT 0"),
            "CREATE TABLE materialized.daily AS (select 1 LIMIT 0)"
        );
        assert_eq!(drop_table_sql("daily"), "DROP TABLE materialized.daily");
    }

    #[test]
    fn status_codes() {
        assert_eq!(ViewError::CreateTable(QueryError::new("boom")).status_code(), 400);
        let missing = ViewError::NotFound {
            project: "shop".to_owned(),
            name: "daily".to_owned(),
        };
        assert_eq!(missing.status_code(), 404);
        assert_eq!(missing.to_string(), "Materialized view 'shop.daily' does not exist");
        let busy = ViewError::from(ExecutionError::TooManyQueries { limit: 3 });
        assert_eq!(busy.status_code(), 429);
    }
}
