//! `RocksDB` storage implementation.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};

use coursepay_core::{
    spend_order, BatchId, ConflictError, CookieBatch, Coupon, CouponId, CourseId,
    DailyLimitAggregate, HoldId, InstructorId, IssuedCoupon, IssuedCouponId, LedgerId, Order,
    OrderId, OrderItemId, SettlementHold, SettlementLedger, UserId, ValidationError,
};

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{CommitOutcome, InstructorSummary, OrderCommit, Store};

/// Number of lock stripes guarding conditional transitions.
const LOCK_STRIPES: usize = 64;

/// RocksDB-backed storage implementation.
///
/// Conditional transitions (order commit, hold release/cancel, settle,
/// wallet debit) serialize on a striped lock keyed by the owning entity,
/// then re-check their guard and write one `WriteBatch`.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    locks: Vec<Mutex<()>>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            locks: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Lock the stripe owning the given entity key.
    fn lock_stripe(&self, key: &[u8]) -> MutexGuard<'_, ()> {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        #[allow(clippy::cast_possible_truncation)]
        let idx = (hasher.finish() as usize) % LOCK_STRIPES;
        self.locks[idx]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get_cf_value<T: serde::de::DeserializeOwned>(
        &self,
        cf_name: &str,
        key: &[u8],
    ) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// The user's spendable batches as of `now`, in FIFO spend order.
    fn spendable_batches(&self, user_id: &UserId, now: DateTime<Utc>) -> Result<Vec<CookieBatch>> {
        let mut batches: Vec<CookieBatch> = self
            .list_batches_by_user(user_id)?
            .into_iter()
            .filter(|b| b.is_spendable(now))
            .collect();
        batches.sort_by(spend_order);
        Ok(batches)
    }

    /// Compute a FIFO debit plan, checking the balance before mutating
    /// anything. Returns the mutated batches and the `(batch, taken)`
    /// breakdown.
    fn plan_debit(
        mut batches: Vec<CookieBatch>,
        amount: i64,
    ) -> Result<(Vec<CookieBatch>, Vec<(BatchId, i64)>)> {
        let balance: i64 = batches.iter().map(|b| b.qty_remain).sum();
        if balance < amount {
            return Err(ValidationError::InsufficientCookies {
                balance,
                required: amount,
            }
            .into());
        }

        let mut breakdown = Vec::new();
        let mut outstanding = amount;
        let mut touched = Vec::new();
        for mut batch in batches.drain(..) {
            if outstanding == 0 {
                break;
            }
            let taken = batch.take(outstanding)?;
            if taken > 0 {
                outstanding -= taken;
                breakdown.push((batch.id, taken));
                touched.push(batch);
            }
        }
        Ok((touched, breakdown))
    }

    /// Look up the ledger row guarding an order item.
    fn ledger_for_item(&self, order_item_id: &OrderItemId) -> Result<SettlementLedger> {
        let cf_index = self.cf(cf::LEDGERS_BY_ITEM)?;
        let ledger_id_bytes = self
            .db
            .get_cf(&cf_index, keys::item_key(order_item_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .ok_or_else(|| StoreError::NotFound {
                entity: "ledger for order item",
                id: order_item_id.to_string(),
            })?;

        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&ledger_id_bytes[..16]);
        let ledger_id = LedgerId::from_bytes(bytes)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        self.get_ledger(&ledger_id)?.ok_or_else(|| StoreError::NotFound {
            entity: "ledger",
            id: ledger_id.to_string(),
        })
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Orders & idempotency
    // =========================================================================

    fn get_order(&self, order_id: &OrderId) -> Result<Option<Order>> {
        self.get_cf_value(cf::ORDERS, &keys::order_key(order_id))
    }

    fn find_order_by_idempotency_key(&self, key: &str) -> Result<Option<Order>> {
        let cf_idem = self.cf(cf::ORDERS_BY_IDEM)?;
        let Some(order_id_bytes) = self
            .db
            .get_cf(&cf_idem, keys::idempotency_key(key))
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&order_id_bytes[..16]);
        let order_id =
            OrderId::from_bytes(bytes).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.get_order(&order_id)
    }

    fn has_paid_purchase(&self, user_id: &UserId, course_id: &CourseId) -> Result<bool> {
        let cf_purchases = self.cf(cf::PURCHASES)?;
        let exists = self
            .db
            .get_cf(&cf_purchases, keys::purchase_key(user_id, course_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .is_some();
        Ok(exists)
    }

    fn commit_order(&self, commit: OrderCommit) -> Result<CommitOutcome> {
        let order = &commit.order;
        let _guard = self.lock_stripe(order.user_id.as_bytes());

        // Idempotency re-check under the lock: the loser of a concurrent
        // same-key race stops here.
        let cf_idem = self.cf(cf::ORDERS_BY_IDEM)?;
        let idem_key = keys::idempotency_key(&order.idempotency_key);
        if self
            .db
            .get_cf(&cf_idem, &idem_key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .is_some()
        {
            return Err(ConflictError::DuplicateRequest {
                key: order.idempotency_key.clone(),
            }
            .into());
        }

        // Purchase guard re-check: two orders with different keys for the
        // same course serialize on the user's stripe, so the second one
        // fails here instead of double-selling.
        for item in &order.items {
            if item.item_type.is_settleable()
                && self.has_paid_purchase(&order.user_id, &item.course_id)?
            {
                return Err(ValidationError::AlreadyPurchased(item.course_id).into());
            }
        }

        // Wallet compare-and-decrement: re-select and re-check balance now
        // that we hold the user's stripe.
        let (debited_batches, wallet_debits) = if commit.wallet_debit > 0 {
            let candidates = self.spendable_batches(&order.user_id, commit.now)?;
            Self::plan_debit(candidates, commit.wallet_debit)?
        } else {
            (Vec::new(), Vec::new())
        };

        // Daily aggregate: lazily created on the first spend of the day.
        let day = commit.now.date_naive();
        let mut daily = self
            .get_daily_limit(&order.user_id, day)?
            .unwrap_or_else(|| DailyLimitAggregate::new(order.user_id, day));
        daily.record(order.method, order.total_amount);

        let cf_orders = self.cf(cf::ORDERS)?;
        let cf_purchases = self.cf(cf::PURCHASES)?;
        let cf_ledgers = self.cf(cf::LEDGERS)?;
        let cf_ledgers_instr = self.cf(cf::LEDGERS_BY_INSTRUCTOR)?;
        let cf_ledgers_item = self.cf(cf::LEDGERS_BY_ITEM)?;
        let cf_holds = self.cf(cf::HOLDS)?;
        let cf_holds_item = self.cf(cf::HOLDS_BY_ITEM)?;
        let cf_holds_due = self.cf(cf::HOLDS_DUE)?;
        let cf_batches = self.cf(cf::BATCHES)?;
        let cf_daily = self.cf(cf::DAILY_LIMITS)?;
        let cf_coupons = self.cf(cf::COUPONS)?;
        let cf_issued = self.cf(cf::ISSUED_COUPONS)?;

        let mut batch = WriteBatch::default();

        batch.put_cf(&cf_orders, keys::order_key(&order.id), Self::serialize(order)?);
        batch.put_cf(&cf_idem, &idem_key, order.id.to_bytes());

        for item in &order.items {
            if item.item_type.is_settleable() {
                batch.put_cf(
                    &cf_purchases,
                    keys::purchase_key(&order.user_id, &item.course_id),
                    order.id.to_bytes(),
                );
            }
        }

        for ledger in &commit.ledgers {
            batch.put_cf(&cf_ledgers, keys::ledger_key(&ledger.id), Self::serialize(ledger)?);
            batch.put_cf(
                &cf_ledgers_instr,
                keys::instructor_ledger_key(&ledger.instructor_id, &ledger.id),
                [],
            );
            if let Some(item_id) = &ledger.order_item_id {
                batch.put_cf(&cf_ledgers_item, keys::item_key(item_id), ledger.id.to_bytes());
            }
        }

        for hold in &commit.holds {
            batch.put_cf(&cf_holds, keys::hold_key(&hold.id), Self::serialize(hold)?);
            batch.put_cf(
                &cf_holds_item,
                keys::item_key(&hold.order_item_id),
                hold.id.to_bytes(),
            );
            batch.put_cf(&cf_holds_due, keys::hold_due_key(hold.hold_until, &hold.id), []);
        }

        for debited in &debited_batches {
            batch.put_cf(&cf_batches, keys::batch_key(&debited.id), Self::serialize(debited)?);
        }

        batch.put_cf(
            &cf_daily,
            keys::daily_limit_key(&order.user_id, day),
            Self::serialize(&daily)?,
        );

        if let Some((coupon, issued)) = &commit.coupon {
            batch.put_cf(&cf_coupons, coupon.id.as_bytes(), Self::serialize(coupon)?);
            batch.put_cf(&cf_issued, issued.id.as_bytes(), Self::serialize(issued)?);
        }

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::info!(
            order_id = %order.id,
            user_id = %order.user_id,
            total = order.total_amount,
            method = ?order.method,
            ledgers = commit.ledgers.len(),
            "order committed"
        );

        Ok(CommitOutcome {
            order_id: order.id,
            order_number: order.order_number.clone(),
            wallet_debits,
        })
    }

    // =========================================================================
    // Cookie wallet
    // =========================================================================

    fn put_batch(&self, batch: &CookieBatch) -> Result<()> {
        let cf_batches = self.cf(cf::BATCHES)?;
        let cf_by_user = self.cf(cf::BATCHES_BY_USER)?;

        let mut write = WriteBatch::default();
        write.put_cf(&cf_batches, keys::batch_key(&batch.id), Self::serialize(batch)?);
        write.put_cf(&cf_by_user, keys::user_batch_key(&batch.user_id, &batch.id), []);

        self.db
            .write(write)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn get_batch(&self, batch_id: &BatchId) -> Result<Option<CookieBatch>> {
        self.get_cf_value(cf::BATCHES, &keys::batch_key(batch_id))
    }

    fn list_batches_by_user(&self, user_id: &UserId) -> Result<Vec<CookieBatch>> {
        let cf_by_user = self.cf(cf::BATCHES_BY_USER)?;
        let prefix = keys::user_batches_prefix(user_id);

        let iter = self.db.iterator_cf(
            &cf_by_user,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );

        let mut batches = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            let batch_id = keys::extract_batch_id_from_user_key(&key);
            if let Some(batch) = self.get_batch(&batch_id)? {
                batches.push(batch);
            }
        }
        Ok(batches)
    }

    fn cookie_balance(&self, user_id: &UserId, now: DateTime<Utc>) -> Result<i64> {
        Ok(self
            .spendable_batches(user_id, now)?
            .iter()
            .map(|b| b.qty_remain)
            .sum())
    }

    fn debit_batches(
        &self,
        user_id: &UserId,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<(BatchId, i64)>> {
        let _guard = self.lock_stripe(user_id.as_bytes());

        let candidates = self.spendable_batches(user_id, now)?;
        let (debited, breakdown) = Self::plan_debit(candidates, amount)?;

        let cf_batches = self.cf(cf::BATCHES)?;
        let mut write = WriteBatch::default();
        for batch in &debited {
            write.put_cf(&cf_batches, keys::batch_key(&batch.id), Self::serialize(batch)?);
        }
        self.db
            .write(write)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(breakdown)
    }

    fn sweep_expired_batches(&self, now: DateTime<Utc>) -> Result<u64> {
        let cf_batches = self.cf(cf::BATCHES)?;
        let iter = self.db.iterator_cf(&cf_batches, IteratorMode::Start);

        let mut candidates = Vec::new();
        for item in iter {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            let batch: CookieBatch = Self::deserialize(&value)?;
            if batch.is_active && batch.is_expired(now) {
                candidates.push((batch.id, batch.user_id));
            }
        }

        // Expire under the owner's stripe, re-reading current state: the
        // scan's copy may predate a debit's write of `qty_remain`, and
        // writing that copy back would undo the debit.
        let mut count = 0u64;
        for (batch_id, user_id) in candidates {
            let _guard = self.lock_stripe(user_id.as_bytes());
            let Some(mut batch) = self.get_batch(&batch_id)? else {
                continue;
            };
            if !batch.is_active || !batch.is_expired(now) {
                continue;
            }
            batch.expire();
            self.db
                .put_cf(&cf_batches, keys::batch_key(&batch.id), Self::serialize(&batch)?)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            count += 1;
        }
        Ok(count)
    }

    // =========================================================================
    // Settlement ledger
    // =========================================================================

    fn get_ledger(&self, ledger_id: &LedgerId) -> Result<Option<SettlementLedger>> {
        self.get_cf_value(cf::LEDGERS, &keys::ledger_key(ledger_id))
    }

    fn list_ledgers_by_instructor(
        &self,
        instructor_id: &InstructorId,
    ) -> Result<Vec<SettlementLedger>> {
        let cf_index = self.cf(cf::LEDGERS_BY_INSTRUCTOR)?;
        let prefix = keys::instructor_ledgers_prefix(instructor_id);

        let iter = self.db.iterator_cf(
            &cf_index,
            IteratorMode::From(&prefix, rocksdb::Direction::Forward),
        );

        let mut ledgers = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            let ledger_id = keys::extract_ledger_id_from_instructor_key(&key);
            if let Some(ledger) = self.get_ledger(&ledger_id)? {
                ledgers.push(ledger);
            }
        }
        Ok(ledgers)
    }

    fn instructor_summary(&self, instructor_id: &InstructorId) -> Result<InstructorSummary> {
        let mut summary = InstructorSummary::default();
        for ledger in self.list_ledgers_by_instructor(instructor_id)? {
            if ledger.settled_at.is_some() {
                summary.settled_net += ledger.net_amount;
            } else if ledger.blocked_at.is_some() {
                summary.blocked_net += ledger.net_amount;
            } else if ledger.eligible {
                summary.eligible_net += ledger.net_amount;
            } else {
                summary.pending_net += ledger.net_amount;
            }
        }
        Ok(summary)
    }

    fn settle_ledger(&self, ledger_id: &LedgerId, now: DateTime<Utc>) -> Result<SettlementLedger> {
        let key = keys::ledger_key(ledger_id);
        let _guard = self.lock_stripe(&key);

        let mut ledger = self.get_ledger(ledger_id)?.ok_or_else(|| StoreError::NotFound {
            entity: "ledger",
            id: ledger_id.to_string(),
        })?;
        ledger.settle(now)?;

        let cf_ledgers = self.cf(cf::LEDGERS)?;
        self.db
            .put_cf(&cf_ledgers, key, Self::serialize(&ledger)?)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::info!(
            ledger_id = %ledger.id,
            instructor_id = %ledger.instructor_id,
            net = ledger.net_amount,
            "ledger settled"
        );
        Ok(ledger)
    }

    // =========================================================================
    // Settlement holds
    // =========================================================================

    fn get_hold(&self, hold_id: &HoldId) -> Result<Option<SettlementHold>> {
        self.get_cf_value(cf::HOLDS, &keys::hold_key(hold_id))
    }

    fn find_hold_by_item(&self, order_item_id: &OrderItemId) -> Result<Option<SettlementHold>> {
        let cf_index = self.cf(cf::HOLDS_BY_ITEM)?;
        let Some(hold_id_bytes) = self
            .db
            .get_cf(&cf_index, keys::item_key(order_item_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hold_id_bytes[..16]);
        let hold_id =
            HoldId::from_bytes(bytes).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.get_hold(&hold_id)
    }

    fn list_due_holds(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<SettlementHold>> {
        let cf_due = self.cf(cf::HOLDS_DUE)?;
        #[allow(clippy::cast_sign_loss)]
        let now_millis = now.timestamp_millis() as u64;

        let iter = self.db.iterator_cf(&cf_due, IteratorMode::Start);
        let mut holds = Vec::new();
        for item in iter {
            if holds.len() >= limit {
                break;
            }
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if keys::due_key_millis(&key) > now_millis {
                // Index is ordered by due time; everything past here is in
                // the future.
                break;
            }
            let hold_id = keys::extract_hold_id_from_due_key(&key);
            if let Some(hold) = self.get_hold(&hold_id)? {
                if hold.is_due(now) {
                    holds.push(hold);
                }
            }
        }
        Ok(holds)
    }

    fn release_hold(&self, hold_id: &HoldId, now: DateTime<Utc>) -> Result<SettlementHold> {
        let key = keys::hold_key(hold_id);
        let _guard = self.lock_stripe(&key);

        let mut hold = self.get_hold(hold_id)?.ok_or_else(|| StoreError::NotFound {
            entity: "hold",
            id: hold_id.to_string(),
        })?;
        hold.release(now)?;

        let mut ledger = self.ledger_for_item(&hold.order_item_id)?;
        ledger.mark_eligible()?;

        let cf_holds = self.cf(cf::HOLDS)?;
        let cf_due = self.cf(cf::HOLDS_DUE)?;
        let cf_ledgers = self.cf(cf::LEDGERS)?;

        let mut write = WriteBatch::default();
        write.put_cf(&cf_holds, &key, Self::serialize(&hold)?);
        write.delete_cf(&cf_due, keys::hold_due_key(hold.hold_until, &hold.id));
        write.put_cf(&cf_ledgers, keys::ledger_key(&ledger.id), Self::serialize(&ledger)?);

        self.db
            .write(write)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::debug!(hold_id = %hold.id, ledger_id = %ledger.id, "hold released, ledger eligible");
        Ok(hold)
    }

    fn cancel_hold(&self, hold_id: &HoldId, now: DateTime<Utc>) -> Result<SettlementHold> {
        let key = keys::hold_key(hold_id);
        let _guard = self.lock_stripe(&key);

        let mut hold = self.get_hold(hold_id)?.ok_or_else(|| StoreError::NotFound {
            entity: "hold",
            id: hold_id.to_string(),
        })?;
        hold.cancel(now)?;

        let mut ledger = self.ledger_for_item(&hold.order_item_id)?;
        ledger.mark_ineligible(now)?;

        let cf_holds = self.cf(cf::HOLDS)?;
        let cf_due = self.cf(cf::HOLDS_DUE)?;
        let cf_ledgers = self.cf(cf::LEDGERS)?;

        let mut write = WriteBatch::default();
        write.put_cf(&cf_holds, &key, Self::serialize(&hold)?);
        write.delete_cf(&cf_due, keys::hold_due_key(hold.hold_until, &hold.id));
        write.put_cf(&cf_ledgers, keys::ledger_key(&ledger.id), Self::serialize(&ledger)?);

        self.db
            .write(write)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::info!(hold_id = %hold.id, ledger_id = %ledger.id, "hold cancelled by refund, ledger blocked");
        Ok(hold)
    }

    // =========================================================================
    // Daily limits
    // =========================================================================

    fn get_daily_limit(
        &self,
        user_id: &UserId,
        day: NaiveDate,
    ) -> Result<Option<DailyLimitAggregate>> {
        self.get_cf_value(cf::DAILY_LIMITS, &keys::daily_limit_key(user_id, day))
    }

    // =========================================================================
    // Coupons
    // =========================================================================

    fn put_coupon(&self, coupon: &Coupon) -> Result<()> {
        let cf_coupons = self.cf(cf::COUPONS)?;
        self.db
            .put_cf(&cf_coupons, coupon.id.as_bytes(), Self::serialize(coupon)?)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn get_coupon(&self, coupon_id: &CouponId) -> Result<Option<Coupon>> {
        self.get_cf_value(cf::COUPONS, coupon_id.as_bytes())
    }

    fn put_issued_coupon(&self, issued: &IssuedCoupon) -> Result<()> {
        let cf_issued = self.cf(cf::ISSUED_COUPONS)?;
        self.db
            .put_cf(&cf_issued, issued.id.as_bytes(), Self::serialize(issued)?)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn get_issued_coupon(&self, issued_id: &IssuedCouponId) -> Result<Option<IssuedCoupon>> {
        self.get_cf_value(cf::ISSUED_COUPONS, issued_id.as_bytes())
    }
}
