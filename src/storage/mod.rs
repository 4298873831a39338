pub mod layout;
pub mod file_lock;
pub mod wal;
pub mod transaction;
pub mod kv_store;
