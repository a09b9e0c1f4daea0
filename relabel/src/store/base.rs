use futures::stream::BoxStream;
use std::future::Future;

use crate::error::RelabelResult;
use crate::types::{Record, RecordId};

/// Single-pass, forward-only sequence of every record present when the scan began.
///
/// Records are read lazily as the cursor is polled. A cursor error ends the scan.
pub type RecordCursor = BoxStream<'static, RelabelResult<Record>>;

/// Transactional store of tagged records.
///
/// Implementations are shared across workers, so they must be cheap to clone and safe to use
/// concurrently. Each page is mutated inside its own transaction obtained with
/// [`RecordStore::begin`].
pub trait RecordStore: Clone + Send + Sync + 'static {
    type Transaction: StoreTransaction;

    /// Opens a cursor over all records currently in the store.
    ///
    /// Records inserted after this call are not visited.
    fn scan(&self) -> impl Future<Output = RelabelResult<RecordCursor>> + Send;

    /// Opens a new transaction.
    fn begin(&self) -> impl Future<Output = RelabelResult<Self::Transaction>> + Send;

    /// Returns the number of records in the store.
    fn count(&self) -> impl Future<Output = RelabelResult<u64>> + Send;
}

/// A unit of work against a [`RecordStore`].
///
/// Dropping a transaction without calling [`StoreTransaction::commit`] rolls it back.
pub trait StoreTransaction: Send {
    /// Adds `tag` to the record. Fails with `RecordNotFound` for an unknown id.
    fn add_tag(
        &mut self,
        id: RecordId,
        tag: &str,
    ) -> impl Future<Output = RelabelResult<()>> + Send;

    /// Removes `tag` from the record. Fails with `RecordNotFound` for an unknown id.
    fn remove_tag(
        &mut self,
        id: RecordId,
        tag: &str,
    ) -> impl Future<Output = RelabelResult<()>> + Send;

    /// Makes every change of this transaction visible atomically.
    fn commit(self) -> impl Future<Output = RelabelResult<()>> + Send;
}
