use futures::{StreamExt, stream};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::{ErrorKind, RelabelResult};
use crate::relabel_error;
use crate::store::base::{RecordCursor, RecordStore, StoreTransaction};
use crate::types::RecordId;

/// How an injected fault manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultType {
    Panic,
    Error(ErrorKind),
}

/// Where and how often [`FaultInjectingStore`] injects faults.
#[derive(Debug, Clone, Default)]
pub struct FaultConfig {
    /// Fault raised by `begin`.
    pub begin: Option<FaultType>,
    /// Fault raised by `commit`.
    pub commit: Option<FaultType>,
    /// Number of transactions left untouched before faults start.
    pub skip_transactions: u64,
    /// Maximum number of transaction faults, unlimited when `None`.
    pub max_faults: Option<u64>,
    /// Ends every scan with a `ScanFailed` error after this many records.
    pub scan_fails_after: Option<usize>,
    /// Delay added to every `begin`, simulating a slow store.
    pub begin_delay: Option<Duration>,
}

#[derive(Debug, Default)]
struct Counters {
    transactions: AtomicU64,
    faults: AtomicU64,
}

/// Store wrapper injecting faults into scans and transactions of the wrapped store.
#[derive(Debug, Clone)]
pub struct FaultInjectingStore<S> {
    inner: S,
    config: Arc<FaultConfig>,
    counters: Arc<Counters>,
}

impl<S> FaultInjectingStore<S> {
    pub fn wrap(inner: S, config: FaultConfig) -> Self {
        Self {
            inner,
            config: Arc::new(config),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Number of faults injected so far.
    pub fn faults_injected(&self) -> u64 {
        self.counters.faults.load(Ordering::SeqCst)
    }

    /// Returns whether the transaction with the given 1-based ordinal is faulty.
    fn is_faulty(&self, ordinal: u64) -> bool {
        if ordinal <= self.config.skip_transactions {
            return false;
        }

        let Some(max_faults) = self.config.max_faults else {
            self.counters.faults.fetch_add(1, Ordering::SeqCst);
            return true;
        };

        self.counters
            .faults
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |faults| {
                (faults < max_faults).then_some(faults + 1)
            })
            .is_ok()
    }
}

fn trigger(fault: FaultType, operation: &'static str) -> RelabelResult<()> {
    match fault {
        FaultType::Panic => panic!("injected panic in `{operation}`"),
        FaultType::Error(kind) => Err(relabel_error!(
            kind,
            "Injected fault",
            format!("fault injected in `{operation}`")
        )),
    }
}

impl<S> RecordStore for FaultInjectingStore<S>
where
    S: RecordStore,
{
    type Transaction = FaultInjectingTransaction<S::Transaction>;

    async fn scan(&self) -> RelabelResult<RecordCursor> {
        let cursor = self.inner.scan().await?;

        let Some(limit) = self.config.scan_fails_after else {
            return Ok(cursor);
        };

        let failure = stream::once(async {
            Err(relabel_error!(
                ErrorKind::ScanFailed,
                "Injected scan failure"
            ))
        });

        Ok(cursor.take(limit).chain(failure).boxed())
    }

    async fn begin(&self) -> RelabelResult<Self::Transaction> {
        if let Some(delay) = self.config.begin_delay {
            tokio::time::sleep(delay).await;
        }

        let ordinal = self.counters.transactions.fetch_add(1, Ordering::SeqCst) + 1;
        let faulty = (self.config.begin.is_some() || self.config.commit.is_some())
            && self.is_faulty(ordinal);

        if faulty && let Some(fault) = self.config.begin {
            trigger(fault, "begin")?;
        }

        let inner = self.inner.begin().await?;

        Ok(FaultInjectingTransaction {
            inner,
            commit_fault: if faulty { self.config.commit } else { None },
        })
    }

    async fn count(&self) -> RelabelResult<u64> {
        self.inner.count().await
    }
}

/// Transaction of a [`FaultInjectingStore`].
#[derive(Debug)]
pub struct FaultInjectingTransaction<T> {
    inner: T,
    commit_fault: Option<FaultType>,
}

impl<T> StoreTransaction for FaultInjectingTransaction<T>
where
    T: StoreTransaction,
{
    async fn add_tag(&mut self, id: RecordId, tag: &str) -> RelabelResult<()> {
        self.inner.add_tag(id, tag).await
    }

    async fn remove_tag(&mut self, id: RecordId, tag: &str) -> RelabelResult<()> {
        self.inner.remove_tag(id, tag).await
    }

    async fn commit(self) -> RelabelResult<()> {
        if let Some(fault) = self.commit_fault {
            trigger(fault, "commit")?;
        }

        self.inner.commit().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::test_utils::seed::seed_people;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn faults_start_after_skipped_transactions_and_stop_at_the_limit() {
        let store = FaultInjectingStore::wrap(
            MemoryStore::new(),
            FaultConfig {
                begin: Some(FaultType::Error(ErrorKind::StoreConnectionFailed)),
                skip_transactions: 1,
                max_faults: Some(2),
                ..Default::default()
            },
        );

        assert!(store.begin().await.is_ok());
        assert!(store.begin().await.is_err());
        assert!(store.begin().await.is_err());
        assert!(store.begin().await.is_ok());
        assert_eq!(store.faults_injected(), 2);
    }

    #[tokio::test]
    async fn commit_fault_rolls_the_transaction_back() {
        let memory = MemoryStore::new();
        seed_people(&memory, 1, 1).await;
        let store = FaultInjectingStore::wrap(
            memory.clone(),
            FaultConfig {
                commit: Some(FaultType::Error(ErrorKind::StoreTransactionFailed)),
                ..Default::default()
            },
        );

        let mut transaction = store.begin().await.unwrap();
        transaction.add_tag(RecordId(1), "Other").await.unwrap();
        let err = transaction.commit().await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::StoreTransactionFailed);
        assert_eq!(memory.commits(), 0);
        assert_eq!(memory.rollbacks(), 1);
    }

    #[tokio::test]
    async fn scan_fails_after_the_configured_records() {
        let memory = MemoryStore::new();
        seed_people(&memory, 5, 1).await;
        let store = FaultInjectingStore::wrap(
            memory,
            FaultConfig {
                scan_fails_after: Some(3),
                ..Default::default()
            },
        );

        let mut cursor = store.scan().await.unwrap();
        for _ in 0..3 {
            assert!(cursor.try_next().await.unwrap().is_some());
        }
        let err = cursor.try_next().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ScanFailed);
    }
}
