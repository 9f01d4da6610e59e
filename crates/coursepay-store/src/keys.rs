//! Key encoding utilities for `RocksDB`.
//!
//! ULID-keyed records sort chronologically for free; composite index keys
//! put the owning entity first so a 16-byte prefix scan walks one owner's
//! records in time order.

use chrono::{DateTime, NaiveDate, Utc};

use coursepay_core::{BatchId, CourseId, HoldId, InstructorId, LedgerId, OrderId, OrderItemId, UserId};

/// Order key: the ULID bytes.
#[must_use]
pub fn order_key(order_id: &OrderId) -> Vec<u8> {
    order_id.to_bytes().to_vec()
}

/// Idempotency reservation key.
#[must_use]
pub fn idempotency_key(key: &str) -> Vec<u8> {
    key.as_bytes().to_vec()
}

/// Duplicate-purchase guard key: `user_id (16) || course_id (16)`.
#[must_use]
pub fn purchase_key(user_id: &UserId, course_id: &CourseId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(course_id.as_bytes());
    key
}

/// Ledger key: the ULID bytes.
#[must_use]
pub fn ledger_key(ledger_id: &LedgerId) -> Vec<u8> {
    ledger_id.to_bytes().to_vec()
}

/// Instructor-ledger index key: `instructor_id (16) || ledger_id (16)`.
#[must_use]
pub fn instructor_ledger_key(instructor_id: &InstructorId, ledger_id: &LedgerId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(instructor_id.as_bytes());
    key.extend_from_slice(&ledger_id.to_bytes());
    key
}

/// Prefix for iterating one instructor's ledger rows.
#[must_use]
pub fn instructor_ledgers_prefix(instructor_id: &InstructorId) -> Vec<u8> {
    instructor_id.as_bytes().to_vec()
}

/// Extract the ledger ID from an instructor-ledger index key.
///
/// # Panics
///
/// Panics if the key is not at least 32 bytes.
#[must_use]
pub fn extract_ledger_id_from_instructor_key(key: &[u8]) -> LedgerId {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[16..32]);
    LedgerId::from_bytes(bytes).expect("valid ULID bytes")
}

/// Order-item lookup key (used by both the ledger and hold item indexes).
#[must_use]
pub fn item_key(order_item_id: &OrderItemId) -> Vec<u8> {
    order_item_id.to_bytes().to_vec()
}

/// Hold key: the ULID bytes.
#[must_use]
pub fn hold_key(hold_id: &HoldId) -> Vec<u8> {
    hold_id.to_bytes().to_vec()
}

/// Due-holds sweep index key: `hold_until (8-byte BE millis) || hold_id (16)`.
///
/// Big-endian timestamps make a forward scan visit holds in due order, so
/// the sweep can stop at the first entry past `now`.
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub fn hold_due_key(hold_until: DateTime<Utc>, hold_id: &HoldId) -> Vec<u8> {
    let mut key = Vec::with_capacity(24);
    key.extend_from_slice(&(hold_until.timestamp_millis() as u64).to_be_bytes());
    key.extend_from_slice(&hold_id.to_bytes());
    key
}

/// Extract the hold ID from a due-holds index key.
///
/// # Panics
///
/// Panics if the key is not at least 24 bytes.
#[must_use]
pub fn extract_hold_id_from_due_key(key: &[u8]) -> HoldId {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[8..24]);
    HoldId::from_bytes(bytes).expect("valid ULID bytes")
}

/// Due timestamp prefix from a due-holds index key.
///
/// # Panics
///
/// Panics if the key is not at least 8 bytes.
#[must_use]
pub fn due_key_millis(key: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&key[..8]);
    u64::from_be_bytes(bytes)
}

/// Batch key: the ULID bytes.
#[must_use]
pub fn batch_key(batch_id: &BatchId) -> Vec<u8> {
    batch_id.to_bytes().to_vec()
}

/// User-batch index key: `user_id (16) || batch_id (16)`.
#[must_use]
pub fn user_batch_key(user_id: &UserId, batch_id: &BatchId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&batch_id.to_bytes());
    key
}

/// Prefix for iterating one user's batches.
#[must_use]
pub fn user_batches_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Extract the batch ID from a user-batch index key.
///
/// # Panics
///
/// Panics if the key is not at least 32 bytes.
#[must_use]
pub fn extract_batch_id_from_user_key(key: &[u8]) -> BatchId {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[16..32]);
    BatchId::from_bytes(bytes).expect("valid ULID bytes")
}

/// Daily aggregate key: `user_id (16) || yyyymmdd (8 ASCII bytes)`.
#[must_use]
pub fn daily_limit_key(user_id: &UserId, day: NaiveDate) -> Vec<u8> {
    let mut key = Vec::with_capacity(24);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(day.format("%Y%m%d").to_string().as_bytes());
    key
}
