pub mod retention;
pub mod view_service;

pub use retention::{DateUnit, RetentionAction, RetentionError, RetentionQueryExecutor};
pub use view_service::{Clock, MaterializedViewService, SystemClock, ViewError};
