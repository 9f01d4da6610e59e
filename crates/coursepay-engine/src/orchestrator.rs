//! Payment orchestration: validate, capture, commit, compensate.

use std::sync::Arc;
use std::time::Duration;

use coursepay_core::{BatchId, Order, OrderId, PaymentMethod, SettlementHold, SettlementLedger};
use coursepay_store::{OrderCommit, Store};

use crate::collaborators::{Clock, CourseCatalog, GatewayCapture, PaymentGateway, UserDirectory};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::validate::{validate_payment, PaymentRequest, ValidationOutcome};

/// What a successful charge returns to the caller.
#[derive(Debug, Clone)]
pub struct OrderReceipt {
    /// The committed order.
    pub order_id: OrderId,

    /// Human-facing order number.
    pub order_number: String,

    /// Amount charged, in minor units.
    pub total_amount: i64,

    /// Wallet debit breakdown for cookie orders, FIFO order.
    pub wallet_debits: Vec<(BatchId, i64)>,
}

impl OrderReceipt {
    fn replayed(order: &Order) -> Self {
        Self {
            order_id: order.id,
            order_number: order.order_number.clone(),
            total_amount: order.total_amount,
            wallet_debits: Vec::new(),
        }
    }
}

/// Drives a payment request through validation, gateway capture, and the
/// atomic commit, compensating the capture if the commit fails.
pub struct PaymentOrchestrator {
    store: Arc<dyn Store>,
    catalog: Arc<dyn CourseCatalog>,
    users: Arc<dyn UserDirectory>,
    gateway: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl PaymentOrchestrator {
    /// Create an orchestrator over the given collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        catalog: Arc<dyn CourseCatalog>,
        users: Arc<dyn UserDirectory>,
        gateway: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            catalog,
            users,
            gateway,
            clock,
            config,
        }
    }

    /// Charge a payment request.
    ///
    /// A replayed idempotency key returns the previously committed order
    /// instead of charging again. Cash orders capture through the gateway
    /// before the commit; if the commit then fails, the capture is refunded.
    ///
    /// # Errors
    ///
    /// Returns the earliest failing validation check, a conflict from the
    /// atomic commit, or a gateway failure.
    pub async fn charge(&self, request: PaymentRequest) -> Result<OrderReceipt> {
        let now = self.clock.now();

        let validated = match validate_payment(
            self.store.as_ref(),
            self.catalog.as_ref(),
            self.users.as_ref(),
            &self.config,
            &request,
            now,
        )? {
            ValidationOutcome::Replayed(order) => return Ok(OrderReceipt::replayed(&order)),
            ValidationOutcome::Fresh(v) => v,
        };

        let order = Order::paid(
            request.user_id,
            validated.items,
            validated.method,
            validated.coupon.as_ref().map(|(_, issued)| issued.id),
            validated.discount,
            request.idempotency_key.clone(),
            now,
        );

        let hold_until = now + self.config.refund_window();
        let mut ledgers = Vec::new();
        let mut holds = Vec::new();
        for item in order.items.iter().filter(|i| i.item_type.is_settleable()) {
            ledgers.push(SettlementLedger::create(
                item.instructor_id,
                order.id,
                Some(item.id),
                item.price,
                self.config.fee_rate_bps,
                now,
            )?);
            holds.push(SettlementHold::create(item.id, order.user_id, hold_until, now));
        }

        // Capture before commit so a declined card never leaves a committed
        // order behind. The reverse failure (capture ok, commit fails) is
        // compensated below.
        let capture = if validated.method == PaymentMethod::Cash && validated.total > 0 {
            Some(self.capture(&request, validated.total).await?)
        } else {
            None
        };

        let wallet_debit = if validated.method == PaymentMethod::Cookie {
            validated.total
        } else {
            0
        };

        let commit = OrderCommit {
            order,
            ledgers,
            holds,
            wallet_debit,
            coupon: validated.coupon,
            now,
        };

        match self.store.commit_order(commit) {
            Ok(outcome) => Ok(OrderReceipt {
                order_id: outcome.order_id,
                order_number: outcome.order_number,
                total_amount: validated.total,
                wallet_debits: outcome.wallet_debits,
            }),
            Err(err) => {
                if let Some(capture) = capture {
                    self.compensate(&capture).await;
                }
                Err(err.into())
            }
        }
    }

    /// Capture through the gateway with a timeout. A timed-out capture is a
    /// payment failure; nothing has been committed yet.
    async fn capture(&self, request: &PaymentRequest, amount: i64) -> Result<GatewayCapture> {
        let timeout = Duration::from_secs(self.config.gateway_timeout_seconds);
        let capture = self
            .gateway
            .capture(&request.user_id, amount, &request.idempotency_key);

        match tokio::time::timeout(timeout, capture).await {
            Ok(Ok(capture)) => Ok(capture),
            Ok(Err(reason)) => Err(EngineError::Gateway(reason)),
            Err(_) => Err(EngineError::Gateway(format!(
                "capture timed out after {}s",
                self.config.gateway_timeout_seconds
            ))),
        }
    }

    /// Refund a capture whose commit failed. A failed compensation is
    /// logged for manual reconciliation; the original commit error still
    /// propagates.
    async fn compensate(&self, capture: &GatewayCapture) {
        match self.gateway.refund(&capture.reference, capture.amount).await {
            Ok(()) => {
                tracing::warn!(
                    reference = %capture.reference,
                    amount = capture.amount,
                    "commit failed after capture; capture refunded"
                );
            }
            Err(reason) => {
                tracing::error!(
                    reference = %capture.reference,
                    amount = capture.amount,
                    %reason,
                    "commit failed after capture AND the compensating refund failed"
                );
            }
        }
    }
}
