use std::sync::Arc;
use tracing::info;
use crate::aggregate::writer::ExpenseWriter;
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::progress::Progress;
use crate::core::types::{ExpenseRow, ItemId, Price, UserId, HALF};
use crate::parallel::pool::WorkerPool;
use crate::storage::kv_store::KvStore;

/// One cursor step over the user store: a user and every item they bought.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPurchases {
    pub user_id: UserId,
    pub item_ids: Vec<ItemId>,
}

/// Joins the user store against the item store.
///
/// A single cursor walk over the user store dispatches one unit of work per
/// user; workers price every purchase against the item store in parallel and
/// hand the finished row to the single CSV writer. Row order in the output is
/// not deterministic.
pub struct Aggregator<'a> {
    config: &'a Config,
    items: Arc<KvStore>,
    users: &'a KvStore,
}

impl<'a> Aggregator<'a> {
    pub fn new(config: &'a Config, items: Arc<KvStore>, users: &'a KvStore) -> Self {
        Aggregator { config, items, users }
    }

    /// Returns the number of rows written.
    pub fn run(self) -> Result<u64> {
        let config = self.config;
        let path = config.user_expenses_path();
        let writer = ExpenseWriter::create(&path, config.workers * 4)?;

        let rows = writer.rows();
        let items = self.items.clone();
        let pool = WorkerPool::start("aggregate", config.workers, config.workers, move |purchases: UserPurchases| {
            let total = total_expense(&items, purchases.user_id, &purchases.item_ids)?;
            rows.send(ExpenseRow { user_id: purchases.user_id, total })
        })?;

        info!(users = self.users.len(), "calculating user expenses...");

        let dispatched = self.dispatch(&pool);
        let aggregated = pool.wait();
        let written = writer.finish();

        let written = written.map_err(|e| e.during(&format!("write {}", path.display())))?;
        aggregated?;
        let dispatched = dispatched?;

        if written != dispatched {
            return Err(Error::new(
                ErrorKind::Internal,
                format!("dispatched {} users but wrote {} rows", dispatched, written),
            ));
        }

        Ok(written)
    }

    fn dispatch(&self, pool: &WorkerPool<UserPurchases>) -> Result<u64> {
        let mut progress = Progress::new("aggregate", self.users.len() as u64);
        let mut cursor = self.users.cursor();
        let mut dispatched = 0u64;

        while let Some((user_id, item_ids)) = cursor.next_entry() {
            pool.submit(UserPurchases { user_id, item_ids })?;
            dispatched += 1;
            progress.tick(dispatched, "users");
        }

        Ok(dispatched)
    }
}

/// Sum the prices of `item_ids` under one read view of the item store.
/// An item without a price means the two input files do not belong together.
pub fn total_expense(items: &KvStore, user_id: UserId, item_ids: &[ItemId]) -> Result<Price> {
    let view = items.read();
    let mut total: Price = 0;

    for &item_id in item_ids {
        let price = view.get_one(item_id).ok_or_else(|| {
            Error::new(
                ErrorKind::NotFound,
                format!("item {} bought by user {} has no price", item_id, user_id),
            )
        })?;

        total = total.checked_add(price).ok_or_else(|| {
            Error::new(ErrorKind::Internal, format!("expense total overflow for user {}", user_id))
        })?;
    }

    Ok(total)
}

/// Split a fixed-width value blob into item ids.
///
/// Stores that pad duplicate value-sets to a fixed width fill the tail with
/// zero segments; decoding stops at the first one. A blob with no zero
/// segment yields every id. `KvStore` cursors return exact value lists, so
/// nothing in the pipeline needs this yet.
#[cfg_attr(not(test), allow(dead_code))]
pub(crate) fn decode_item_ids(blob: &[u8]) -> Vec<ItemId> {
    blob.chunks_exact(HALF)
        .take_while(|segment| segment.iter().any(|&b| b != 0))
        .map(|segment| {
            let mut id = [0u8; HALF];
            id.copy_from_slice(segment);
            u64::from_le_bytes(id)
        })
        .collect()
}

/// Write one CSV row per user in `users` to `config.user_expenses_path()`.
pub fn aggregate_expenses(config: &Config, items: Arc<KvStore>, users: &KvStore) -> Result<u64> {
    Aggregator::new(config, items, users).run()
}
