//! Column family definitions.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Committed orders, keyed by `order_id` (ULID).
    pub const ORDERS: &str = "orders";

    /// Idempotency reservations, keyed by idempotency key; value is the
    /// committing `order_id`.
    pub const ORDERS_BY_IDEM: &str = "orders_by_idem";

    /// Duplicate-purchase guard, keyed by `user_id || course_id`; value is
    /// the `order_id` of the paid purchase.
    pub const PURCHASES: &str = "purchases";

    /// Settlement ledger rows, keyed by `ledger_id` (ULID).
    pub const LEDGERS: &str = "ledgers";

    /// Index: ledgers by instructor, keyed by `instructor_id || ledger_id`.
    /// Value is empty (index only).
    pub const LEDGERS_BY_INSTRUCTOR: &str = "ledgers_by_instructor";

    /// Index: ledger by order item, keyed by `order_item_id`; value is the
    /// `ledger_id`.
    pub const LEDGERS_BY_ITEM: &str = "ledgers_by_item";

    /// Settlement holds, keyed by `hold_id` (ULID).
    pub const HOLDS: &str = "holds";

    /// Index: hold by order item, keyed by `order_item_id`; value is the
    /// `hold_id`.
    pub const HOLDS_BY_ITEM: &str = "holds_by_item";

    /// Sweep index of holds still `Held`, keyed by
    /// `hold_until (8-byte BE millis) || hold_id`. Entries are removed when
    /// the hold leaves `Held`.
    pub const HOLDS_DUE: &str = "holds_due";

    /// Cookie wallet batches, keyed by `batch_id` (ULID).
    pub const BATCHES: &str = "batches";

    /// Index: batches by user, keyed by `user_id || batch_id`.
    /// Value is empty (index only).
    pub const BATCHES_BY_USER: &str = "batches_by_user";

    /// Daily spend aggregates, keyed by `user_id || yyyymmdd`.
    pub const DAILY_LIMITS: &str = "daily_limits";

    /// Coupon templates, keyed by `coupon_id`.
    pub const COUPONS: &str = "coupons";

    /// Issued (per-user) coupons, keyed by `issued_coupon_id`.
    pub const ISSUED_COUPONS: &str = "issued_coupons";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ORDERS,
        cf::ORDERS_BY_IDEM,
        cf::PURCHASES,
        cf::LEDGERS,
        cf::LEDGERS_BY_INSTRUCTOR,
        cf::LEDGERS_BY_ITEM,
        cf::HOLDS,
        cf::HOLDS_BY_ITEM,
        cf::HOLDS_DUE,
        cf::BATCHES,
        cf::BATCHES_BY_USER,
        cf::DAILY_LIMITS,
        cf::COUPONS,
        cf::ISSUED_COUPONS,
    ]
}
