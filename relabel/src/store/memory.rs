use futures::StreamExt;
use futures::stream;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

use crate::bail;
use crate::error::{ErrorKind, RelabelError, RelabelResult};
use crate::store::base::{RecordCursor, RecordStore, StoreTransaction};
use crate::types::{Record, RecordId};

#[derive(Debug, Default)]
struct Inner {
    records: BTreeMap<RecordId, Record>,
    last_id: i64,
}

#[derive(Debug, Default)]
struct TransactionStats {
    commits: AtomicU64,
    rollbacks: AtomicU64,
}

/// In-memory record store.
///
/// Records are kept in id order, which is also the scan order. Transactions stage their tag
/// changes and apply them under a single lock at commit, so concurrent readers never observe a
/// partially applied page.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    stats: Arc<TransactionStats>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record and returns its id. Ids are assigned sequentially starting at 1.
    pub async fn insert(
        &self,
        tags: Vec<String>,
        attributes: BTreeMap<String, serde_json::Value>,
    ) -> RecordId {
        let mut inner = self.inner.lock().await;
        inner.last_id += 1;

        let id = RecordId(inner.last_id);
        let mut record = Record::new(id);
        for tag in tags {
            record.add_tag(tag);
        }
        record.attributes = attributes;
        inner.records.insert(id, record);

        id
    }

    pub async fn get(&self, id: RecordId) -> Option<Record> {
        self.inner.lock().await.records.get(&id).cloned()
    }

    /// Returns a copy of every record in id order.
    pub async fn records(&self) -> Vec<Record> {
        self.inner.lock().await.records.values().cloned().collect()
    }

    /// Counts records per tag. A record with several tags is counted once for each of them.
    pub async fn tag_counts(&self) -> BTreeMap<String, usize> {
        let inner = self.inner.lock().await;

        let mut counts = BTreeMap::new();
        for tag in inner.records.values().flat_map(|record| record.tags.iter()) {
            *counts.entry(tag.clone()).or_insert(0) += 1;
        }

        counts
    }

    /// Counts records carrying `tag`.
    pub async fn count_of(&self, tag: &str) -> usize {
        let inner = self.inner.lock().await;
        inner
            .records
            .values()
            .filter(|record| record.has_tag(tag))
            .count()
    }

    /// Number of committed transactions.
    pub fn commits(&self) -> u64 {
        self.stats.commits.load(Ordering::Relaxed)
    }

    /// Number of transactions dropped without committing.
    pub fn rollbacks(&self) -> u64 {
        self.stats.rollbacks.load(Ordering::Relaxed)
    }
}

impl RecordStore for MemoryStore {
    type Transaction = MemoryTransaction;

    async fn scan(&self) -> RelabelResult<RecordCursor> {
        let ids: Vec<RecordId> = self.inner.lock().await.records.keys().copied().collect();
        let inner = self.inner.clone();

        let cursor = stream::unfold(
            (inner, ids.into_iter()),
            |(inner, mut ids)| async move {
                while let Some(id) = ids.next() {
                    let record = inner.lock().await.records.get(&id).cloned();
                    if let Some(record) = record {
                        return Some((Ok::<_, RelabelError>(record), (inner, ids)));
                    }
                }

                None
            },
        );

        Ok(cursor.boxed())
    }

    async fn begin(&self) -> RelabelResult<MemoryTransaction> {
        Ok(MemoryTransaction {
            inner: self.inner.clone(),
            stats: self.stats.clone(),
            operations: Vec::new(),
            committed: false,
        })
    }

    async fn count(&self) -> RelabelResult<u64> {
        Ok(self.inner.lock().await.records.len() as u64)
    }
}

#[derive(Debug)]
enum TagOperation {
    Add(RecordId, String),
    Remove(RecordId, String),
}

impl TagOperation {
    fn record_id(&self) -> RecordId {
        match self {
            TagOperation::Add(id, _) | TagOperation::Remove(id, _) => *id,
        }
    }
}

/// Transaction over a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryTransaction {
    inner: Arc<Mutex<Inner>>,
    stats: Arc<TransactionStats>,
    operations: Vec<TagOperation>,
    committed: bool,
}

impl MemoryTransaction {
    async fn ensure_exists(&self, id: RecordId) -> RelabelResult<()> {
        if !self.inner.lock().await.records.contains_key(&id) {
            bail!(
                ErrorKind::RecordNotFound,
                "Record not found",
                format!("record {id} does not exist")
            );
        }

        Ok(())
    }
}

impl StoreTransaction for MemoryTransaction {
    async fn add_tag(&mut self, id: RecordId, tag: &str) -> RelabelResult<()> {
        self.ensure_exists(id).await?;
        self.operations.push(TagOperation::Add(id, tag.to_owned()));

        Ok(())
    }

    async fn remove_tag(&mut self, id: RecordId, tag: &str) -> RelabelResult<()> {
        self.ensure_exists(id).await?;
        self.operations.push(TagOperation::Remove(id, tag.to_owned()));

        Ok(())
    }

    async fn commit(mut self) -> RelabelResult<()> {
        let inner = self.inner.clone();
        let mut inner = inner.lock().await;

        if let Some(missing) = self
            .operations
            .iter()
            .map(TagOperation::record_id)
            .find(|id| !inner.records.contains_key(id))
        {
            bail!(
                ErrorKind::RecordNotFound,
                "Record not found",
                format!("record {missing} was removed before commit")
            );
        }

        for operation in self.operations.drain(..) {
            match operation {
                TagOperation::Add(id, tag) => {
                    if let Some(record) = inner.records.get_mut(&id) {
                        record.add_tag(tag);
                    }
                }
                TagOperation::Remove(id, tag) => {
                    if let Some(record) = inner.records.get_mut(&id) {
                        record.remove_tag(&tag);
                    }
                }
            }
        }

        self.committed = true;
        self.stats.commits.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.committed {
            self.stats.rollbacks.fetch_add(1, Ordering::Relaxed);
        }
    }
}
