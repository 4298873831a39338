pub mod core;
pub mod storage;
pub mod parallel;
pub mod memory;
pub mod generate;
pub mod ingest;
pub mod aggregate;

pub use crate::core::config::Config;
pub use crate::core::error::{Error, ErrorKind, Result};
pub use crate::core::pipeline::Pipeline;

/*
┌──────────────────────────────────────────────────────────────────────────────────────┐
│                               PRICEJOIN DATA FLOW                                     │
└──────────────────────────────────────────────────────────────────────────────────────┘

  generate                         process
  ────────                         ───────

  Generator (1 RNG stream)         ┌──────────── ingest (2 threads) ─────────────┐
     │                             │                                              │
     ├─ user block ─┐ rayon::join  │  user_items.bin ─read─▶ BufferPool           │
     └─ item block ─┘  per block   │        │                  │ PooledBuffer     │
            │                      │        ▼                  ▼                  │
   user_items.bin                  │  WorkerPool<PooledBuffer> (cap 0, N workers) │
   item_prices.bin                 │        │ 1 Transaction per block             │
                                   │        ▼                                     │
                                   │  KvStore user-items  (Multi)                 │
                                   │  KvStore item-prices (Unique + policy)       │
                                   └──────────────────────────────────────────────┘
                                                   │ join barrier
                                                   ▼
                                   users.cursor() ─▶ WorkerPool<UserPurchases>
                                                          │ items.read().get_one()
                                                          ▼
                                                   RowSender ─▶ ExpenseWriter thread
                                                                     │
                                                                     ▼
                                                             user_expenses.csv

  KvStore = StorageLayout + FileLock + Wal (len|crc32|bincode batch) + BTreeMap
*/
