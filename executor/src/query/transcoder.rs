use crate::client::protocol::{Column, QueryResults};
use crate::query::type_mapper::{TypeMappingError, map_type};
use chrono::offset::LocalResult;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeDelta, TimeZone};
use chrono_tz::Tz;
use model::query::{Cell, Row, SchemaField};
use serde_json::Value;
use thiserror::Error;
use tracing::error;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

const TIMESTAMP: &str = "timestamp";
const TIMESTAMP_WITH_TIME_ZONE: &str = "timestamp with time zone";
const DATE: &str = "date";

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("Unsupported type of column '{column}': {source}")]
    Schema {
        column: String,
        #[source]
        source: TypeMappingError,
    },
    #[error("Invalid DATE value '{value}' in column '{column}': {source}")]
    InvalidDate {
        column: String,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error("DATE column '{column}' holds a non-string value: {value}")]
    NonStringDate { column: String, value: Value },
    #[error("Row has {actual} values but the schema has {expected} columns")]
    RowWidth { expected: usize, actual: usize },
}

#[derive(Error, Debug)]
enum TimestampError {
    #[error("not a string")]
    NotAString,
    #[error("missing time zone")]
    MissingZone,
    #[error("unknown time zone '{0}'")]
    UnknownZone(String),
    #[error("{0}")]
    Parse(#[from] chrono::ParseError),
    #[error("local time does not exist in the zone")]
    NonExistent,
}

/// Accumulates the schema and rows of one execution, batch by batch.
pub struct RowTranscoder {
    zone: Tz,
    columns: Option<Vec<SchemaField>>,
    rows: Vec<Row>,
}

impl RowTranscoder {
    pub fn new(zone: Tz) -> Self {
        Self {
            zone,
            columns: None,
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> Option<&[SchemaField]> {
        self.columns.as_deref()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_parts(self) -> (Vec<SchemaField>, Vec<Row>) {
        (self.columns.unwrap_or_default(), self.rows)
    }

    /// Appends the rows of `batch`. Batches carrying an error or no column
    /// descriptor are skipped. On error nothing of the batch is appended.
    pub fn transform_and_add(&mut self, batch: &QueryResults) -> Result<(), TranscodeError> {
        if batch.error.is_some() {
            return Ok(());
        }
        let Some(batch_columns) = batch.columns.as_deref() else {
            return Ok(());
        };

        if self.columns.is_none() {
            self.columns = Some(schema_of(batch_columns)?);
        }
        let width = self.columns.as_ref().map_or(0, Vec::len);

        let Some(data) = batch.data.as_deref() else {
            return Ok(());
        };

        let mut transcoded = Vec::with_capacity(data.len());
        for raw_row in data {
            if raw_row.len() > width {
                return Err(TranscodeError::RowWidth {
                    expected: width,
                    actual: raw_row.len(),
                });
            }
            let mut row = Vec::with_capacity(width);
            for (value, column) in raw_row.iter().zip(
                batch_columns
                    .iter()
                    .map(Some)
                    .chain(std::iter::repeat(None)),
            ) {
                row.push(self.transcode_cell(value, column)?);
            }
            row.resize(width, Cell::Null);
            transcoded.push(row);
        }

        self.rows.extend(transcoded);
        Ok(())
    }

    fn transcode_cell(&self, value: &Value, column: Option<&Column>) -> Result<Cell, TranscodeError> {
        if value.is_null() {
            return Ok(Cell::Null);
        }
        let Some(column) = column else {
            return Ok(Cell::from(value.clone()));
        };

        match column.type_signature.raw_type.as_str() {
            TIMESTAMP => Ok(self.soft_timestamp(column, value, |raw| {
                parse_local_timestamp(raw, &self.zone)
            })),
            TIMESTAMP_WITH_TIME_ZONE => Ok(self.soft_timestamp(column, value, parse_zoned_timestamp)),
            DATE => {
                let Some(raw) = value.as_str() else {
                    return Err(TranscodeError::NonStringDate {
                        column: column.name.clone(),
                        value: value.clone(),
                    });
                };
                NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .map(Cell::Date)
                    .map_err(|source| TranscodeError::InvalidDate {
                        column: column.name.clone(),
                        value: raw.to_owned(),
                        source,
                    })
            }
            _ => Ok(Cell::from(value.clone())),
        }
    }

    /// Timestamp parse failures only cost the cell.
    fn soft_timestamp<F>(&self, column: &Column, value: &Value, parse: F) -> Cell
    where
        F: FnOnce(&str) -> Result<DateTime<FixedOffset>, TimestampError>,
    {
        let parsed = value.as_str().ok_or(TimestampError::NotAString).and_then(parse);
        match parsed {
            Ok(timestamp) => Cell::Timestamp(timestamp),
            Err(e) => {
                error!(
                    column = %column.name,
                    value = %value,
                    error = %e,
                    "Error while parsing {}", column.type_signature.raw_type
                );
                Cell::Null
            }
        }
    }
}

fn schema_of(columns: &[Column]) -> Result<Vec<SchemaField>, TranscodeError> {
    columns
        .iter()
        .map(|column| {
            let signature = &column.type_signature;
            map_type(&signature.raw_type, signature.type_argument_names())
                .map(|field_type| SchemaField::new(column.name.clone(), field_type))
                .map_err(|source| TranscodeError::Schema {
                    column: column.name.clone(),
                    source,
                })
        })
        .collect()
}

fn parse_local_timestamp(raw: &str, zone: &Tz) -> Result<DateTime<FixedOffset>, TimestampError> {
    let naive = NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)?;
    localize(zone, naive)
}

/// Common zone abbreviations and their UTC offsets in seconds. An abbreviation
/// names one side of a DST pair, so it maps to a fixed offset.
const ZONE_ABBREVIATIONS: &[(&str, i32)] = &[
    ("HST", -10 * 3600),
    ("AKST", -9 * 3600),
    ("AKDT", -8 * 3600),
    ("PST", -8 * 3600),
    ("PDT", -7 * 3600),
    ("MST", -7 * 3600),
    ("MDT", -6 * 3600),
    ("CST", -6 * 3600),
    ("CDT", -5 * 3600),
    ("EST", -5 * 3600),
    ("EDT", -4 * 3600),
    ("WET", 0),
    ("WEST", 3600),
    ("BST", 3600),
    ("CET", 3600),
    ("CEST", 2 * 3600),
    ("EET", 2 * 3600),
    ("EEST", 3 * 3600),
    ("MSK", 3 * 3600),
    ("JST", 9 * 3600),
    ("KST", 9 * 3600),
    ("AEST", 10 * 3600),
    ("AEDT", 11 * 3600),
];

fn abbreviation_offset(zone: &str) -> Option<FixedOffset> {
    ZONE_ABBREVIATIONS
        .iter()
        .find(|(name, _)| *name == zone)
        .and_then(|&(_, seconds)| FixedOffset::east_opt(seconds))
}

fn parse_zoned_timestamp(raw: &str) -> Result<DateTime<FixedOffset>, TimestampError> {
    let (local, zone) = raw.rsplit_once(' ').ok_or(TimestampError::MissingZone)?;
    let naive = NaiveDateTime::parse_from_str(local, TIMESTAMP_FORMAT)?;
    let offset = match abbreviation_offset(zone) {
        Some(offset) => offset,
        None => {
            if let Ok(tz) = zone.parse::<Tz>() {
                return localize(&tz, naive);
            }
            zone.parse::<FixedOffset>()
                .map_err(|_| TimestampError::UnknownZone(zone.to_owned()))?
        }
    };
    offset
        .from_local_datetime(&naive)
        .single()
        .ok_or(TimestampError::NonExistent)
}

/// Attaches `zone` to a wall-clock time. Times inside a DST gap are moved
/// forward by the length of the gap, ambiguous times take the earlier offset.
fn localize(zone: &Tz, naive: NaiveDateTime) -> Result<DateTime<FixedOffset>, TimestampError> {
    match zone.from_local_datetime(&naive) {
        LocalResult::Single(timestamp) => Ok(timestamp.fixed_offset()),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.fixed_offset()),
        LocalResult::None => {
            let day_before = naive
                .checked_sub_signed(TimeDelta::days(1))
                .ok_or(TimestampError::NonExistent)?;
            let offset_before = zone.offset_from_utc_datetime(&day_before).fix();
            let utc = naive - TimeDelta::seconds(i64::from(offset_before.local_minus_utc()));
            Ok(zone.from_utc_datetime(&utc).fixed_offset())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use model::query::FieldType;
    use serde_json::json;

    fn column(name: &str, raw_type: &str) -> Column {
        serde_json::from_value(json!({
            "name": name,
            "type": raw_type,
            "typeSignature": {"rawType": raw_type, "arguments": []}
        }))
        .unwrap()
    }

    fn batch(columns: Option<Vec<Column>>, data: Vec<Vec<Value>>) -> QueryResults {
        QueryResults {
            id: "q".to_owned(),
            columns,
            data: Some(data),
            ..Default::default()
        }
    }

    fn transcode_one(zone: Tz, raw_type: &str, value: Value) -> Cell {
        let mut transcoder = RowTranscoder::new(zone);
        transcoder
            .transform_and_add(&batch(Some(vec![column("c", raw_type)]), vec![vec![value]]))
            .unwrap();
        transcoder.rows()[0][0].clone()
    }

    #[test]
    fn timestamp_in_utc() {
        let cell = transcode_one(Tz::UTC, "timestamp", json!("2021-01-02 03:04:05.000"));
        let expected = Utc.with_ymd_and_hms(2021, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(cell.as_timestamp().map(|ts| ts.with_timezone(&Utc)), Some(expected));
    }

    #[test]
    fn timestamp_takes_session_zone() {
        let cell = transcode_one(
            chrono_tz::Europe::Berlin,
            "timestamp",
            json!("2021-07-01 12:00:00.250"),
        );
        let timestamp = cell.as_timestamp().unwrap();
        assert_eq!(timestamp.offset().local_minus_utc(), 2 * 3600);
        assert_eq!(timestamp.to_rfc3339(), "2021-07-01T12:00:00.250+02:00");
    }

    #[test]
    fn timestamp_in_dst_gap_moves_forward() {
        // 02:30 does not exist in Berlin on 2021-03-28, clocks jump from 02:00 to 03:00
        let cell = transcode_one(
            chrono_tz::Europe::Berlin,
            "timestamp",
            json!("2021-03-28 02:30:00.000"),
        );
        assert_eq!(
            cell.as_timestamp().unwrap().to_rfc3339(),
            "2021-03-28T03:30:00+02:00"
        );
    }

    #[test]
    fn ambiguous_timestamp_takes_earlier_offset() {
        let cell = transcode_one(
            chrono_tz::Europe::Berlin,
            "timestamp",
            json!("2021-10-31 02:30:00.000"),
        );
        assert_eq!(cell.as_timestamp().unwrap().offset().local_minus_utc(), 2 * 3600);
    }

    #[test]
    fn malformed_timestamp_becomes_null() {
        assert_eq!(transcode_one(Tz::UTC, "timestamp", json!("yesterday")), Cell::Null);
        assert_eq!(transcode_one(Tz::UTC, "timestamp", json!(1609556645)), Cell::Null);
    }

    #[test]
    fn timestamp_with_time_zone() {
        let named = transcode_one(
            Tz::UTC,
            "timestamp with time zone",
            json!("2021-01-02 03:04:05.000 America/New_York"),
        );
        assert_eq!(
            named.as_timestamp().unwrap().to_rfc3339(),
            "2021-01-02T03:04:05-05:00"
        );

        let utc = transcode_one(
            chrono_tz::Asia::Tokyo,
            "timestamp with time zone",
            json!("2021-01-02 03:04:05.000 UTC"),
        );
        assert_eq!(utc.as_timestamp().unwrap().to_rfc3339(), "2021-01-02T03:04:05+00:00");

        let offset = transcode_one(
            Tz::UTC,
            "timestamp with time zone",
            json!("2021-01-02 03:04:05.000 +05:30"),
        );
        assert_eq!(
            offset.as_timestamp().unwrap().to_rfc3339(),
            "2021-01-02T03:04:05+05:30"
        );
    }

    #[test]
    fn zone_abbreviations_take_their_fixed_offset() {
        for (raw, expected) in [
            ("2021-07-01 12:00:00.000 PDT", "2021-07-01T12:00:00-07:00"),
            ("2021-01-15 12:00:00.000 PST", "2021-01-15T12:00:00-08:00"),
            ("2021-07-01 12:00:00.000 CEST", "2021-07-01T12:00:00+02:00"),
            // CET stays +01:00 even in summer
            ("2021-07-01 12:00:00.000 CET", "2021-07-01T12:00:00+01:00"),
        ] {
            let cell = transcode_one(Tz::UTC, "timestamp with time zone", json!(raw));
            assert_eq!(cell.as_timestamp().unwrap().to_rfc3339(), expected, "{raw}");
        }
    }

    #[test]
    fn malformed_timestamp_with_time_zone_becomes_null() {
        for raw in ["2021-01-02 03:04:05.000", "2021-01-02 03:04:05.000 Mars/Olympus"] {
            assert_eq!(
                transcode_one(Tz::UTC, "timestamp with time zone", json!(raw)),
                Cell::Null,
                "{raw}"
            );
        }
    }

    #[test]
    fn date_is_parsed() {
        let cell = transcode_one(Tz::UTC, "date", json!("2021-01-02"));
        assert_eq!(cell.as_date(), NaiveDate::from_ymd_opt(2021, 1, 2));
    }

    #[test]
    fn malformed_date_fails_the_batch() {
        let mut transcoder = RowTranscoder::new(Tz::UTC);
        let result = transcoder.transform_and_add(&batch(
            Some(vec![column("d", "date")]),
            vec![vec![json!("2021-01-02")], vec![json!("02/01/2021")]],
        ));
        assert!(matches!(result, Err(TranscodeError::InvalidDate { .. })));
        assert!(transcoder.rows().is_empty(), "No partial batch");
    }

    #[test]
    fn other_values_pass_through() {
        assert_eq!(
            transcode_one(Tz::UTC, "bigint", json!(42)),
            Cell::Value(json!(42))
        );
        assert_eq!(transcode_one(Tz::UTC, "date", Value::Null), Cell::Null);

        let array: Column = serde_json::from_value(json!({
            "name": "tags",
            "type": "array(varchar)",
            "typeSignature": {"rawType": "array", "arguments": [
                {"kind": "TYPE", "value": {"rawType": "varchar", "arguments": []}}
            ]}
        }))
        .unwrap();
        let mut transcoder = RowTranscoder::new(Tz::UTC);
        transcoder
            .transform_and_add(&batch(Some(vec![array]), vec![vec![json!(["a", "b"])]]))
            .unwrap();
        assert_eq!(transcoder.rows()[0][0], Cell::Value(json!(["a", "b"])));
        assert_eq!(
            transcoder.columns().unwrap(),
            &[SchemaField::new("tags", FieldType::array_of(FieldType::String))]
        );
    }

    #[test]
    fn skipped_batches_leave_state_unchanged() {
        let mut transcoder = RowTranscoder::new(Tz::UTC);

        transcoder
            .transform_and_add(&batch(None, vec![vec![json!(1)]]))
            .unwrap();
        assert!(transcoder.columns().is_none());

        let mut failed = batch(Some(vec![column("a", "bigint")]), vec![vec![json!(1)]]);
        failed.error = serde_json::from_value(json!({"message": "boom"})).unwrap();
        transcoder.transform_and_add(&failed).unwrap();
        assert!(transcoder.columns().is_none());
        assert!(transcoder.rows().is_empty());
    }

    #[test]
    fn schema_is_set_once() {
        let mut transcoder = RowTranscoder::new(Tz::UTC);
        transcoder
            .transform_and_add(&batch(Some(vec![column("a", "bigint")]), vec![vec![json!(1)]]))
            .unwrap();
        transcoder
            .transform_and_add(&batch(Some(vec![column("b", "varchar")]), vec![vec![json!("x")]]))
            .unwrap();

        assert_eq!(
            transcoder.columns().unwrap(),
            &[SchemaField::new("a", FieldType::Long)]
        );
        assert_eq!(transcoder.rows().len(), 2);
    }

    #[test]
    fn short_rows_are_padded_and_wide_rows_rejected() {
        let mut transcoder = RowTranscoder::new(Tz::UTC);
        let columns = vec![column("a", "bigint"), column("b", "varchar")];
        transcoder
            .transform_and_add(&batch(Some(columns.clone()), vec![vec![json!(1)]]))
            .unwrap();
        assert_eq!(transcoder.rows()[0], vec![Cell::Value(json!(1)), Cell::Null]);

        let result = transcoder.transform_and_add(&batch(
            Some(columns),
            vec![vec![json!(1), json!("x"), json!(true)]],
        ));
        assert!(matches!(
            result,
            Err(TranscodeError::RowWidth { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn map_with_non_string_key_fails_schema() {
        let column: Column = serde_json::from_value(json!({
            "name": "m",
            "type": "map(bigint,double)",
            "typeSignature": {"rawType": "map", "arguments": [
                {"kind": "TYPE", "value": {"rawType": "bigint", "arguments": []}},
                {"kind": "TYPE", "value": {"rawType": "double", "arguments": []}}
            ]}
        }))
        .unwrap();
        let mut transcoder = RowTranscoder::new(Tz::UTC);
        let result = transcoder.transform_and_add(&batch(Some(vec![column]), vec![]));
        assert!(matches!(result, Err(TranscodeError::Schema { .. })));
    }
}
