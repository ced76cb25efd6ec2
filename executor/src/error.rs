use crate::query::pool::PoolError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("There are already {limit} running queries. Please calm down.")]
    TooManyQueries { limit: usize },

    #[error("Unknown session time zone '{zone}'")]
    InvalidTimeZone { zone: String },

    #[error("Failed to start query executor thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

impl ExecutionError {
    pub fn is_admission_rejected(&self) -> bool {
        matches!(self, ExecutionError::TooManyQueries { .. })
    }

    /// HTTP status a web layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            ExecutionError::TooManyQueries { .. } => 429,
            ExecutionError::InvalidTimeZone { .. } => 400,
            ExecutionError::WorkerSpawn(_) => 500,
        }
    }
}

impl From<PoolError> for ExecutionError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Saturated { limit } => ExecutionError::TooManyQueries { limit },
            PoolError::Spawn(e) => ExecutionError::WorkerSpawn(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturated_pool_is_too_many_requests() {
        let err = ExecutionError::from(PoolError::Saturated { limit: 1000 });
        assert!(err.is_admission_rejected());
        assert_eq!(err.status_code(), 429);
        assert_eq!(
            err.to_string(),
            "There are already 1000 running queries. Please calm down."
        );
    }

    #[test]
    fn bad_zone_is_client_error() {
        let err = ExecutionError::InvalidTimeZone {
            zone: "Nowhere".to_owned(),
        };
        assert!(!err.is_admission_rejected());
        assert_eq!(err.status_code(), 400);
    }
}
