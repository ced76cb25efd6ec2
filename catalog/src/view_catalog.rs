use crate::database::State;
use chrono::{DateTime, Utc};
use model::IntoCondition;
use model::view::{self, CreateMaterializedView, Entity as ViewEntity, GetMaterializedView};
use sea_orm::{ActiveModelTrait, ActiveValue, DbErr, EntityTrait, QueryFilter, QueryOrder, Set};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ViewCatalogError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

/// Bookkeeping for materialized views. Only records metadata, the backing
/// tables live on the query engine.
pub struct ViewCatalog {
    db: State,
}

impl ViewCatalog {
    pub fn from(db: State) -> Arc<Self> {
        Arc::new(Self { db })
    }

    pub async fn save_materialized_view(
        &self,
        req: CreateMaterializedView,
    ) -> Result<view::Model, ViewCatalogError> {
        view::ActiveModel::from(req)
            .insert(&self.db.conn)
            .await
            .map_err(Into::into)
    }

    pub async fn get_materialized_view(
        &self,
        project: &str,
        name: &str,
    ) -> Result<Option<view::Model>, ViewCatalogError> {
        ViewEntity::find_by_id((project.to_owned(), name.to_owned()))
            .one(&self.db.conn)
            .await
            .map_err(Into::into)
    }

    pub async fn get_materialized_views(
        &self,
        project: &str,
    ) -> Result<Vec<view::Model>, ViewCatalogError> {
        ViewEntity::find()
            .filter(
                GetMaterializedView::new()
                    .in_project(project.to_owned())
                    .into_condition(),
            )
            .order_by_asc(view::Column::Name)
            .all(&self.db.conn)
            .await
            .map_err(Into::into)
    }

    pub async fn delete_materialized_view(
        &self,
        project: &str,
        name: &str,
    ) -> Result<Option<view::Model>, ViewCatalogError> {
        let existing = self.get_materialized_view(project, name).await?;
        if existing.is_some() {
            ViewEntity::delete_by_id((project.to_owned(), name.to_owned()))
                .exec(&self.db.conn)
                .await?;
        }
        Ok(existing)
    }

    pub async fn update_materialized_view(
        &self,
        project: &str,
        name: &str,
        last_update: DateTime<Utc>,
    ) -> Result<view::Model, ViewCatalogError> {
        let model = view::ActiveModel {
            project: ActiveValue::Unchanged(project.to_owned()),
            name: ActiveValue::Unchanged(name.to_owned()),
            last_update: Set(Some(last_update)),
            ..Default::default()
        };
        model.update(&self.db.conn).await.map_err(|e| match e {
            DbErr::RecordNotUpdated => {
                ViewCatalogError::Database(DbErr::RecordNotFound(format!("{project}.{name}")))
            }
            other => other.into(),
        })
    }
}
