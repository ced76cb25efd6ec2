use sea_orm::ActiveValue::Set;
use sea_orm::Condition;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub type ProjectName = String;
pub type ViewName = String;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, DeriveEntityModel)]
#[sea_orm(table_name = "materialized_view")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub project: ProjectName,
    #[sea_orm(primary_key, auto_increment = false)]
    pub name: ViewName,
    pub table_name: String,
    pub query: String,
    pub update_interval_millis: Option<i64>,
    pub last_update: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn update_interval(&self) -> Option<Duration> {
        self.update_interval_millis
            .and_then(|ms| u64::try_from(ms).ok())
            .map(Duration::from_millis)
    }
}

#[derive(Clone, Debug)]
pub struct CreateMaterializedView {
    pub project: ProjectName,
    pub name: ViewName,
    pub table_name: String,
    pub query: String,
    pub update_interval: Option<Duration>,
}

impl CreateMaterializedView {
    pub fn new(
        project: impl Into<ProjectName>,
        name: impl Into<ViewName>,
        table_name: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            name: name.into(),
            table_name: table_name.into(),
            query: query.into(),
            update_interval: None,
        }
    }

    pub fn update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = Some(interval);
        self
    }
}

impl From<CreateMaterializedView> for ActiveModel {
    fn from(req: CreateMaterializedView) -> Self {
        Self {
            project: Set(req.project),
            name: Set(req.name),
            table_name: Set(req.table_name),
            query: Set(req.query),
            update_interval_millis: Set(req
                .update_interval
                .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))),
            last_update: Set(None),
        }
    }
}

impl From<Model> for CreateMaterializedView {
    fn from(view: Model) -> Self {
        let update_interval = view.update_interval();
        Self {
            project: view.project,
            name: view.name,
            table_name: view.table_name,
            query: view.query,
            update_interval,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct GetMaterializedView {
    pub project: Option<ProjectName>,
}

impl GetMaterializedView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_project(mut self, project: ProjectName) -> Self {
        self.project = Some(project);
        self
    }
}

impl crate::IntoCondition for GetMaterializedView {
    fn into_condition(self) -> Condition {
        Condition::all().add_option(self.project.map(|v| Column::Project.eq(v)))
    }
}
