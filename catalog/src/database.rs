use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, DatabaseConnection};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

pub enum StateBackend {
    Memory,
    Sqlite { url: String },
}

#[derive(Clone)]
pub struct State {
    pub conn: DatabaseConnection,
    pub endpoint: String,
}

#[derive(Error, Debug)]
pub enum StateError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl State {
    pub async fn with(backend: StateBackend) -> Result<Self, StateError> {
        const MAX_DURATION: Duration = Duration::new(u64::MAX / 4, 0);

        let (endpoint, opts) = match backend {
            StateBackend::Memory => {
                const IN_MEMORY_DB: &str = "sqlite::memory:";
                // A single connection, otherwise every pooled connection sees its own empty database
                let opts = ConnectOptions::new(IN_MEMORY_DB)
                    .min_connections(1)
                    .max_connections(1)
                    .acquire_timeout(MAX_DURATION)
                    .connect_timeout(MAX_DURATION)
                    .to_owned();
                (IN_MEMORY_DB.to_owned(), opts)
            }
            StateBackend::Sqlite { url } => {
                let opts = ConnectOptions::new(url.clone())
                    .max_connections(8)
                    .connect_timeout(Duration::from_secs(5))
                    .to_owned();
                (url, opts)
            }
        };

        info!(endpoint = %endpoint, "Connecting to metadata store");
        let conn = sea_orm::Database::connect(opts).await?;
        Ok(Self { conn, endpoint })
    }

    pub async fn migrate(&self) -> Result<(), StateError> {
        Migrator::up(&self.conn, None).await?;
        Ok(())
    }

    #[cfg(any(test, feature = "testing"))]
    pub async fn for_test() -> Self {
        let this = Self::with(StateBackend::Memory).await.unwrap();
        this.migrate().await.unwrap();
        this
    }
}
