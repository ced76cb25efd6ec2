use crate::database::State;
use model::collection::{self, CreateCollection, Entity as CollectionEntity};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QuerySelect};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CollectionCatalogError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

pub struct CollectionCatalog {
    db: State,
}

impl CollectionCatalog {
    pub fn from(db: State) -> Arc<Self> {
        Arc::new(Self { db })
    }

    pub async fn create_collection(
        &self,
        req: CreateCollection,
    ) -> Result<collection::Model, CollectionCatalogError> {
        collection::ActiveModel::from(req)
            .insert(&self.db.conn)
            .await
            .map_err(Into::into)
    }

    /// Names of all collections of `project`, sorted.
    pub async fn list_collection_names(
        &self,
        project: &str,
    ) -> Result<BTreeSet<String>, CollectionCatalogError> {
        let names: Vec<String> = CollectionEntity::find()
            .select_only()
            .column(collection::Column::Name)
            .filter(collection::Column::Project.eq(project))
            .into_tuple()
            .all(&self.db.conn)
            .await?;
        Ok(names.into_iter().collect())
    }
}
