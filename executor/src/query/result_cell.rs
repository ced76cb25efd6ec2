use model::query::QueryResult;
use std::sync::Arc;
use tokio::sync::watch;

/// Write-once slot for the terminal result, observable by any number of
/// waiters.
pub(crate) struct ResultCell {
    tx: watch::Sender<Option<Arc<QueryResult>>>,
}

impl ResultCell {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    pub(crate) fn resolved(result: QueryResult) -> Self {
        let (tx, _) = watch::channel(Some(Arc::new(result)));
        Self { tx }
    }

    /// Returns false if the cell was already set; the first result wins.
    pub(crate) fn complete(&self, result: QueryResult) -> bool {
        let mut result = Some(Arc::new(result));
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = result.take();
            true
        })
    }

    pub(crate) fn get(&self) -> Option<Arc<QueryResult>> {
        self.tx.borrow().clone()
    }

    pub(crate) fn is_set(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub(crate) async fn wait(&self) -> Arc<QueryResult> {
        let mut rx = self.tx.subscribe();
        let slot = rx
            .wait_for(Option::is_some)
            .await
            .expect("Sender is owned by the cell");
        slot.clone().expect("wait_for returns only once the slot is set")
    }
}
