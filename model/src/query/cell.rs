use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::Serialize;

/// A transcoded result value. Temporal wire strings become typed values,
/// everything else passes through as the JSON value the engine sent.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Timestamp(DateTime<FixedOffset>),
    Date(NaiveDate),
    Value(serde_json::Value),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_timestamp(&self) -> Option<&DateTime<FixedOffset>> {
        match self {
            Cell::Timestamp(ts) => Some(ts),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Cell::Date(date) => Some(*date),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&serde_json::Value> {
        match self {
            Cell::Value(value) => Some(value),
            _ => None,
        }
    }
}

impl From<serde_json::Value> for Cell {
    fn from(value: serde_json::Value) -> Self {
        if value.is_null() {
            Cell::Null
        } else {
            Cell::Value(value)
        }
    }
}

pub type Row = Vec<Cell>;
