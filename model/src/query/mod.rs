pub mod cell;
pub mod execution_state;
pub mod field_type;
pub mod result;
pub mod stats;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use cell::{Cell, Row};
pub use execution_state::ExecutionState;
pub use field_type::{FieldType, SchemaField};
pub use result::{QueryError, QueryResult};
pub use stats::{QueryStats, StatsState};

/// Session context a statement is executed under.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSession {
    pub user: String,
    pub source: Option<String>,
    pub catalog: String,
    pub schema: String,
    /// IANA zone id; `None` means UTC.
    pub time_zone: Option<String>,
    pub language: Option<String>,
    pub properties: BTreeMap<String, String>,
}

impl ClientSession {
    pub fn new(user: impl Into<String>, catalog: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            source: None,
            catalog: catalog.into(),
            schema: schema.into(),
            time_zone: None,
            language: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn with_time_zone(mut self, time_zone: impl Into<String>) -> Self {
        self.time_zone = Some(time_zone.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Immutable SQL text plus the session it runs in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Statement {
    pub session: ClientSession,
    pub sql: String,
}

impl Statement {
    pub fn new(session: ClientSession, sql: impl Into<String>) -> Self {
        Self {
            session,
            sql: sql.into(),
        }
    }
}
