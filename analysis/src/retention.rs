//! Retention cohorts: of the users active in one period, how many come back
//! in each following period.

use catalog::collection_catalog::{CollectionCatalog, CollectionCatalogError};
use chrono::{Datelike, Days, Months, NaiveDate, NaiveTime};
use executor::{ExecutionError, QueryExecution, QueryExecutor};
use std::collections::BTreeSet;
use std::sync::Arc;
use strum::{Display, EnumString};
use thiserror::Error;
use tracing::{debug, instrument};

/// Periods further apart than this are not reported.
pub const MAXIMUM_LEAD: i64 = 15;

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DateUnit {
    Day,
    Week,
    Month,
}

/// Events of one collection, optionally narrowed by a raw SQL predicate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetentionAction {
    pub collection: String,
    pub filter: Option<String>,
}

impl RetentionAction {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filter: None,
        }
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

#[derive(Clone, Debug)]
pub struct RetentionQuery {
    pub project: String,
    pub first_action: Option<RetentionAction>,
    pub returning_action: Option<RetentionAction>,
    pub date_unit: DateUnit,
    pub dimension: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl RetentionQuery {
    pub fn new(
        project: impl Into<String>,
        date_unit: DateUnit,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Self {
        Self {
            project: project.into(),
            first_action: None,
            returning_action: None,
            date_unit,
            dimension: None,
            start_date,
            end_date,
        }
    }

    pub fn first_action(mut self, action: RetentionAction) -> Self {
        self.first_action = Some(action);
        self
    }

    pub fn returning_action(mut self, action: RetentionAction) -> Self {
        self.returning_action = Some(action);
        self
    }

    pub fn dimension(mut self, dimension: impl Into<String>) -> Self {
        self.dimension = Some(dimension.into());
        self
    }
}

#[derive(Error, Debug)]
pub enum RetentionError {
    #[error("startDate and endDate are invalid: {start} .. {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
    #[error("Project '{0}' has no collections")]
    NoCollections(String),
    #[error(transparent)]
    Catalog(#[from] CollectionCatalogError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

pub struct RetentionQueryExecutor {
    executor: Arc<QueryExecutor>,
    collections: Arc<CollectionCatalog>,
}

impl RetentionQueryExecutor {
    pub fn new(executor: Arc<QueryExecutor>, collections: Arc<CollectionCatalog>) -> Self {
        Self {
            executor,
            collections,
        }
    }

    #[instrument(skip_all, fields(project = %req.project, unit = %req.date_unit))]
    pub async fn query(&self, req: &RetentionQuery) -> Result<QueryExecution, RetentionError> {
        let collections = match req.returning_action {
            Some(_) => BTreeSet::new(),
            None => self.collections.list_collection_names(&req.project).await?,
        };
        let connector = &self.executor.config().cold_storage_connector;
        let sql = retention_sql(req, connector, &collections)?;
        debug!(sql = %sql, "Built retention query");
        Ok(self.executor.execute_raw_query(sql)?)
    }
}

/// Period boundaries the leads are counted over.
fn normalize(
    unit: DateUnit,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<(NaiveDate, NaiveDate), RetentionError> {
    let invalid = || RetentionError::InvalidDateRange { start, end };
    match unit {
        DateUnit::Day => Ok((start, end)),
        DateUnit::Week => {
            let sunday = |d: NaiveDate| d - Days::new(u64::from(d.weekday().num_days_from_sunday()));
            let end = sunday(end).checked_add_days(Days::new(7)).ok_or_else(invalid)?;
            Ok((sunday(start), end))
        }
        DateUnit::Month => {
            let first = |d: NaiveDate| d - Days::new(u64::from(d.day0()));
            let end = first(end).checked_add_months(Months::new(1)).ok_or_else(invalid)?;
            Ok((first(start), end))
        }
    }
}

/// Whole units from `start` to `end`, negative when `end` comes first.
fn units_between(unit: DateUnit, start: NaiveDate, end: NaiveDate) -> i64 {
    match unit {
        DateUnit::Day => (end - start).num_days(),
        DateUnit::Week => (end - start).num_days() / 7,
        DateUnit::Month => {
            let months = i64::from(end.year() - start.year()) * 12 + i64::from(end.month())
                - i64::from(start.month());
            if months > 0 && end.day() < start.day() {
                months - 1
            } else if months < 0 && end.day() > start.day() {
                months + 1
            } else {
                months
            }
        }
    }
}

fn lead_range(unit: DateUnit, start: NaiveDate, end: NaiveDate) -> Result<i64, RetentionError> {
    let (from, to) = normalize(unit, start, end)?;
    let range = MAXIMUM_LEAD.min(units_between(unit, from, to));
    if range < 0 {
        return Err(RetentionError::InvalidDateRange { start, end });
    }
    Ok(range)
}

fn epoch_seconds(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

/// `(time column, transformation of the grouped time)` of a unit.
fn time_columns(unit: DateUnit) -> (String, String) {
    match unit {
        DateUnit::Day => (
            format!("time/{SECONDS_PER_DAY}"),
            format!("cast(from_unixtime((data.time)*{SECONDS_PER_DAY}) as date)"),
        ),
        DateUnit::Week | DateUnit::Month => (
            format!("cast(date_trunc('{unit}', from_unixtime(time)) as date)"),
            "data.time".to_owned(),
        ),
    }
}

struct Relations<'a> {
    connector: &'a str,
    project: &'a str,
    time_column: &'a str,
    dimension: Option<&'a str>,
    start_ts: i64,
    end_ts: i64,
}

impl Relations<'_> {
    fn select(&self, collection: &str, filter: Option<&str>) -> String {
        let dimension = self
            .dimension
            .map(|d| format!(", {d} as dimension"))
            .unwrap_or_default();
        let filter = filter.map(|f| format!(" and {f}")).unwrap_or_default();
        format!(
            "select user, {} as time{dimension} from {}.{}.{collection} where time between {} and {}{filter}",
            self.time_column, self.connector, self.project, self.start_ts, self.end_ts
        )
    }
}

pub(crate) fn retention_sql(
    req: &RetentionQuery,
    connector: &str,
    collections: &BTreeSet<String>,
) -> Result<String, RetentionError> {
    let unit = req.date_unit;
    let range = lead_range(unit, req.start_date, req.end_date)?;
    let (time_column, transformation) = time_columns(unit);
    let relations = Relations {
        connector,
        project: &req.project,
        time_column: &time_column,
        dimension: req.dimension.as_deref(),
        start_ts: epoch_seconds(req.start_date),
        end_ts: epoch_seconds(req.end_date),
    };

    let source = match &req.returning_action {
        Some(action) => relations.select(&action.collection, action.filter.as_deref()),
        None if collections.is_empty() => {
            return Err(RetentionError::NoCollections(req.project.clone()));
        }
        None => collections
            .iter()
            .map(|collection| relations.select(collection, None))
            .collect::<Vec<_>>()
            .join(" union all "),
    };

    let sql = match &req.first_action {
        Some(first) => {
            let subtraction = match unit {
                DateUnit::Day => "returning_action.time - data.time".to_owned(),
                _ => format!("date_diff('{unit}', data.time, returning_action.time)"),
            };
            let first_query = format!(
                "{} group by 1, 2{}",
                relations.select(&first.collection, first.filter.as_deref()),
                if req.dimension.is_some() { ", 3" } else { "" }
            );
            let grouped = if req.dimension.is_some() {
                "data.dimension"
            } else {
                transformation.as_str()
            };
            format!(
                "with first_action as (\n  {first_query}\n), \n\
                 returning_action as (\n  {source}\n) \n\
                 select {grouped}, null as lead, count(distinct user) count from first_action data group by 1,2 union all\n\
                 select {grouped}, {subtraction}, count(distinct data.user) \n\
                 from first_action data join returning_action on (data.user = returning_action.user) \n\
                 where data.time < returning_action.time and {subtraction} < {MAXIMUM_LEAD} group by 1, 2"
            )
        }
        None => {
            // At least one lead column keeps the statement well-formed
            let leads: Vec<i64> = (0..range.max(1)).collect();
            let subtraction = |i: i64| match unit {
                DateUnit::Day => format!("lead{i}-time"),
                _ => format!("date_diff('{unit}', time, lead{i})"),
            };
            let lead_windows = join(&leads, |i| {
                format!("lead(time, {i}) over (partition by user order by user, time) lead{i}")
            });
            let lead_columns = join(&leads, |i| format!("({}) as lead{i}", subtraction(i)));
            let groups = join(&leads, |i| (i + 2).to_string());
            let lead_names = join(&leads, |i| format!("lead{i}"));
            format!(
                "with daily_groups as (\n  select user, time\n  from ({source}) group by 1, 2\n), \n\
                 lead_relations as (\n  select user, time, {lead_windows}\n  from daily_groups\n),\n\
                 result as (\n   select {transformation} as time, {lead_columns}, count(distinct user) as count\n   \
                 from lead_relations data group by 1, {groups} order by 1\n) \n\
                 select {transformation}, null as lead, count(user) as count from daily_groups data group by 1\n\
                 union all (select * from (select time, lead, count from result \n\
                 CROSS JOIN unnest(array[{lead_names}]) t(lead)) where lead < {MAXIMUM_LEAD})"
            )
        }
    };
    Ok(sql)
}

fn join(leads: &[i64], f: impl Fn(i64) -> String) -> String {
    leads.iter().map(|&i| f(i)).collect::<Vec<_>>().join(", ")
}
