use crate::view::ProjectName;
use sea_orm::ActiveValue::Set;
use sea_orm::entity::prelude::*;

pub type CollectionName = String;

/// An event collection of a project; each collection is one table on the
/// cold-storage connector.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "collection")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub project: ProjectName,
    #[sea_orm(primary_key, auto_increment = false)]
    pub name: CollectionName,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Clone, Debug)]
pub struct CreateCollection {
    pub project: ProjectName,
    pub name: CollectionName,
}

impl CreateCollection {
    pub fn new(project: impl Into<ProjectName>, name: impl Into<CollectionName>) -> Self {
        Self {
            project: project.into(),
            name: name.into(),
        }
    }
}

impl From<CreateCollection> for ActiveModel {
    fn from(req: CreateCollection) -> Self {
        Self {
            project: Set(req.project),
            name: Set(req.name),
        }
    }
}
