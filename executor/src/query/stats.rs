use crate::client::protocol::StatementStats;
use model::query::{QueryStats, StatsState};
use tracing::warn;

/// Progress snapshot from the engine's live statement statistics.
pub fn from_remote(stats: &StatementStats) -> QueryStats {
    let state = stats.state.parse::<StatsState>().unwrap_or_else(|_| {
        warn!(state = %stats.state, "Unknown remote query state, reporting RUNNING");
        StatsState::Running
    });

    let percentage = match state {
        StatsState::Finished => 100,
        _ if stats.total_splits == 0 => 0,
        _ => stats.completed_splits * 100 / stats.total_splits,
    };

    QueryStats {
        percentage: stats.scheduled.then_some(percentage),
        state,
        node_count: stats.nodes,
        processed_rows: stats.processed_rows,
        processed_bytes: stats.processed_bytes,
        user_time_millis: stats.user_time_millis,
        cpu_time_millis: stats.cpu_time_millis,
        wall_time_millis: stats.wall_time_millis,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(state: &str, scheduled: bool, total: u32, completed: u32) -> StatementStats {
        StatementStats {
            state: state.to_owned(),
            scheduled,
            total_splits: total,
            completed_splits: completed,
            ..Default::default()
        }
    }

    #[test]
    fn percentage_uses_floor_division() {
        let stats = from_remote(&remote("RUNNING", true, 3, 2));
        assert_eq!(stats.state, StatsState::Running);
        assert_eq!(stats.percentage, Some(66));
    }

    #[test]
    fn finished_is_complete() {
        assert_eq!(from_remote(&remote("FINISHED", true, 3, 1)).percentage, Some(100));
    }

    #[test]
    fn no_splits_yet_is_zero() {
        assert_eq!(from_remote(&remote("PLANNING", true, 0, 0)).percentage, Some(0));
    }

    #[test]
    fn unscheduled_withholds_percentage() {
        let stats = from_remote(&remote("QUEUED", false, 10, 5));
        assert_eq!(stats.state, StatsState::Queued);
        assert_eq!(stats.percentage, None);
    }

    #[test]
    fn unknown_state_reports_running() {
        assert_eq!(
            from_remote(&remote("RECONFIGURING", true, 1, 0)).state,
            StatsState::Running
        );
    }

    #[test]
    fn counters_are_copied() {
        let stats = from_remote(&StatementStats {
            state: "running".to_owned(),
            nodes: 4,
            processed_rows: 10,
            processed_bytes: 2048,
            user_time_millis: 1,
            cpu_time_millis: 2,
            wall_time_millis: 3,
            ..Default::default()
        });
        assert_eq!(stats.node_count, 4);
        assert_eq!(stats.processed_rows, 10);
        assert_eq!(stats.processed_bytes, 2048);
        assert_eq!(
            (stats.user_time_millis, stats.cpu_time_millis, stats.wall_time_millis),
            (1, 2, 3)
        );
    }
}
