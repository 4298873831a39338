use serde::{Deserialize, Serialize};

/// On-disk record width: an 8-byte key followed by an 8-byte value.
pub const RECORD_SIZE: usize = 16;

/// Width of one record half.
pub const HALF: usize = RECORD_SIZE / 2;

/// Upper bound (exclusive) for generated prices.
pub const MAX_PRICE: u64 = 1000;

pub type UserId = u64;
pub type ItemId = u64;
pub type Price = u64;

/// One synthetic purchase event, split across both data files when written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Record {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub price: Price,
}

impl Record {
    /// Write `[user_id | item_id]` and `[item_id | price]` into two record slots.
    pub fn encode_into(&self, user_slot: &mut [u8], item_slot: &mut [u8]) {
        encode_pair(self.user_id, self.item_id, user_slot);
        encode_pair(self.item_id, self.price, item_slot);
    }
}

/// Encode a `(key, value)` pair as two little-endian u64 halves.
pub fn encode_pair(key: u64, value: u64, slot: &mut [u8]) {
    slot[..HALF].copy_from_slice(&key.to_le_bytes());
    slot[HALF..RECORD_SIZE].copy_from_slice(&value.to_le_bytes());
}

/// Decode the `(key, value)` halves of one record slot.
pub fn decode_pair(slot: &[u8]) -> (u64, u64) {
    let mut key = [0u8; HALF];
    let mut value = [0u8; HALF];
    key.copy_from_slice(&slot[..HALF]);
    value.copy_from_slice(&slot[HALF..RECORD_SIZE]);
    (u64::from_le_bytes(key), u64::from_le_bytes(value))
}

/// Walk a block in `RECORD_SIZE` strides. Trailing bytes short of a full record are ignored.
pub fn records(block: &[u8]) -> impl Iterator<Item = (u64, u64)> + '_ {
    block.chunks_exact(RECORD_SIZE).map(decode_pair)
}

/// One output row: a user and the summed price of everything they bought.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseRow {
    pub user_id: UserId,
    pub total: Price,
}
