pub mod collection_catalog;
pub mod database;
pub mod view_catalog;

use collection_catalog::CollectionCatalog;
use database::State;
use std::sync::Arc;
use view_catalog::ViewCatalog;

/// Facade over the metadata catalogs, all sharing one database connection.
#[derive(Clone)]
pub struct Catalog {
    pub view: Arc<ViewCatalog>,
    pub collection: Arc<CollectionCatalog>,
}

impl Catalog {
    pub fn from(db: State) -> Self {
        Self {
            view: ViewCatalog::from(db.clone()),
            collection: CollectionCatalog::from(db),
        }
    }

    #[cfg(any(test, feature = "testing"))]
    pub async fn for_test() -> Self {
        Self::from(State::for_test().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::collection::CreateCollection;
    use model::view::CreateMaterializedView;

    #[tokio::test]
    async fn test_catalogs_share_connection() {
        let catalog = Catalog::for_test().await;
        catalog
            .view
            .save_materialized_view(CreateMaterializedView::new("shop", "v", "v", "select 1"))
            .await
            .unwrap();
        catalog
            .collection
            .create_collection(CreateCollection::new("shop", "pageview"))
            .await
            .unwrap();

        assert_eq!(catalog.view.get_materialized_views("shop").await.unwrap().len(), 1);
        assert_eq!(
            catalog.collection.list_collection_names("shop").await.unwrap().len(),
            1
        );
    }
}
