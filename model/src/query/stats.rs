use serde::Serialize;
use strum::{Display, EnumString};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString, Serialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatsState {
    WaitingForAvailableThread,
    Queued,
    Planning,
    Starting,
    Running,
    Blocked,
    Finishing,
    Finished,
    Failed,
}

/// Point-in-time progress snapshot of one execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStats {
    /// `None` until the engine confirms scheduling has begun.
    pub percentage: Option<u32>,
    pub state: StatsState,
    pub node_count: u32,
    pub processed_rows: u64,
    pub processed_bytes: u64,
    pub user_time_millis: u64,
    pub cpu_time_millis: u64,
    pub wall_time_millis: u64,
}

impl QueryStats {
    pub fn with_state(state: StatsState) -> Self {
        Self {
            percentage: None,
            state,
            node_count: 0,
            processed_rows: 0,
            processed_bytes: 0,
            user_time_millis: 0,
            cpu_time_millis: 0,
            wall_time_millis: 0,
        }
    }

    pub fn waiting() -> Self {
        Self::with_state(StatsState::WaitingForAvailableThread)
    }

    pub fn failed() -> Self {
        Self::with_state(StatsState::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_states_parse_in_any_case() {
        assert_eq!("running".parse::<StatsState>().unwrap(), StatsState::Running);
        assert_eq!("FINISHED".parse::<StatsState>().unwrap(), StatsState::Finished);
        assert!("EXPLODED".parse::<StatsState>().is_err());
    }

    #[test]
    fn waiting_snapshot_has_no_percentage() {
        let stats = QueryStats::waiting();
        assert_eq!(stats.state, StatsState::WaitingForAvailableThread);
        assert_eq!(stats.percentage, None);
    }
}
