use clap::Parser;
use executor::EngineConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Runs one statement on a Presto-compatible engine and prints the result as
/// JSON lines.
#[derive(Parser, Debug)]
#[command(name = "presto-exec", version, long_about = None)]
pub struct Cli {
    /// TOML file with the engine settings
    #[arg(short = 'c', long = "config", env = "PRESTO_EXEC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Engine coordinator URL (e.g., http://localhost:8080)
    #[arg(short = 's', long = "server")]
    pub server: Option<String>,

    #[arg(long = "catalog")]
    pub catalog: Option<String>,

    /// Default schema of the session
    #[arg(long = "schema")]
    pub schema: Option<String>,

    #[arg(short = 'u', long = "user")]
    pub user: Option<String>,

    /// IANA zone timestamps are rendered in
    #[arg(long = "time-zone")]
    pub time_zone: Option<String>,

    /// How often progress is reported
    #[arg(long = "poll-interval-ms", default_value_t = 1000)]
    pub poll_interval_ms: u64,

    /// Statement to run; read from stdin when omitted
    pub sql: Option<String>,
}

impl Cli {
    /// Command line flags win over the file and the environment.
    pub fn apply(&self, config: &mut EngineConfig) {
        if let Some(server) = &self.server {
            config.address = server.clone();
        }
        if let Some(catalog) = &self.catalog {
            config.catalog = catalog.clone();
        }
        if let Some(user) = &self.user {
            config.user = user.clone();
        }
        if let Some(time_zone) = &self.time_zone {
            config.time_zone = Some(time_zone.clone());
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}
