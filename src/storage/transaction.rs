use std::sync::atomic::{AtomicU64, Ordering};
use crate::core::error::{Error, ErrorKind, Result};
use crate::storage::kv_store::{CommitOutcome, KvStore};

/// Transaction ID generator
static TRANSACTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Transaction state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

/// Write transaction against one store.
///
/// Puts are buffered in the write set and reach the store in one atomic
/// commit. Dropping an active transaction aborts it.
pub struct Transaction<'a> {
    pub id: u64,
    state: TransactionState,
    writes: Vec<(u64, u64)>,
    first_ordinal: Option<u64>,
    store: &'a KvStore,
}

impl<'a> Transaction<'a> {
    pub(crate) fn begin(store: &'a KvStore) -> Self {
        Transaction {
            id: TRANSACTION_ID_COUNTER.fetch_add(1, Ordering::SeqCst),
            state: TransactionState::Active,
            writes: Vec::new(),
            first_ordinal: None,
            store,
        }
    }

    /// Pre-size the write set for a known number of puts.
    pub fn with_capacity(mut self, puts: usize) -> Self {
        self.writes.reserve(puts);
        self
    }

    /// Place the puts in the store's insert order: put `i` takes ordinal
    /// `first + i`. Unplaced transactions are ordered by commit.
    pub fn at_ordinal(mut self, first: u64) -> Self {
        self.first_ordinal = Some(first);
        self
    }

    pub fn put(&mut self, key: u64, value: u64) -> Result<()> {
        self.check_active()?;
        self.writes.push((key, value));
        Ok(())
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn pending(&self) -> usize {
        self.writes.len()
    }

    /// Commit every buffered put, or none of them.
    pub fn commit(mut self) -> Result<CommitOutcome> {
        self.check_active()?;

        match self.store.commit_batch(self.first_ordinal, &self.writes) {
            Ok(outcome) => {
                self.state = TransactionState::Committed;
                Ok(outcome)
            }
            Err(e) => {
                self.abort();
                Err(e)
            }
        }
    }

    pub fn rollback(mut self) {
        self.abort();
    }

    fn abort(&mut self) {
        self.state = TransactionState::Aborted;
        self.writes.clear();
    }

    fn check_active(&self) -> Result<()> {
        if self.state != TransactionState::Active {
            return Err(Error::new(ErrorKind::InvalidState, format!("transaction {} is not active", self.id)));
        }
        Ok(())
    }
}

impl<'a> Drop for Transaction<'a> {
    fn drop(&mut self) {
        if self.state == TransactionState::Active {
            self.abort();
        }
    }
}
