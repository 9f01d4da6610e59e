//! Refund-window and payout lifecycle tests.

mod common;

use chrono::Duration;

use common::{cash_request, Harness};
use coursepay_core::{ConflictError, HoldStatus, IntegrityError, ValidationError};
use coursepay_engine::EngineError;
use coursepay_store::Store;

#[tokio::test]
async fn hold_released_after_window_then_settled_once() {
    let h = Harness::new();
    let user = h.users.register();
    let (course, instructor) = h.publish_course(50_000);

    h.orchestrator()
        .charge(cash_request(user, vec![course], 50_000, "s-1"))
        .await
        .unwrap();
    let settlement = h.settlement();

    // inside the window: nothing due, nothing eligible
    let stats = settlement.release_due_holds(100).unwrap();
    assert_eq!(stats.released, 0);
    assert_eq!(h.settlement().instructor_summary(&instructor).unwrap().pending_net, 35_000);

    h.clock.advance(Duration::days(7) + Duration::seconds(1));
    let stats = settlement.release_due_holds(100).unwrap();
    assert_eq!(stats.released, 1);

    let summary = settlement.instructor_summary(&instructor).unwrap();
    assert_eq!(summary.eligible_net, 35_000);
    assert_eq!(summary.pending_net, 0);

    // a second sweep finds nothing (idempotent)
    assert_eq!(settlement.release_due_holds(100).unwrap().released, 0);

    let ledger = &settlement.ledgers_for_instructor(&instructor).unwrap()[0];
    let settled = settlement.settle(&ledger.id).unwrap();
    assert!(settled.settled_at.is_some());
    assert_eq!(
        settlement.instructor_summary(&instructor).unwrap().settled_net,
        35_000
    );

    // payout is one-shot
    let err = settlement.settle(&ledger.id).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Conflict(ConflictError::AlreadySettled(_))
    ));
}

#[tokio::test]
async fn settle_before_release_is_an_integrity_error() {
    let h = Harness::new();
    let user = h.users.register();
    let (course, instructor) = h.publish_course(10_000);

    h.orchestrator()
        .charge(cash_request(user, vec![course], 10_000, "s-2"))
        .await
        .unwrap();

    let settlement = h.settlement();
    let ledger = &settlement.ledgers_for_instructor(&instructor).unwrap()[0];
    let err = settlement.settle(&ledger.id).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Integrity(IntegrityError::SettleIneligible(_))
    ));
}

#[tokio::test]
async fn refund_in_window_blocks_the_payout_forever() {
    let h = Harness::new();
    let user = h.users.register();
    let (course, instructor) = h.publish_course(10_000);

    let receipt = h
        .orchestrator()
        .charge(cash_request(user, vec![course], 10_000, "s-3"))
        .await
        .unwrap();
    let order = h.store.get_order(&receipt.order_id).unwrap().unwrap();
    let item_id = order.items[0].id;

    let settlement = h.settlement();
    let cancelled = settlement.cancel_for_refund(&item_id).unwrap();
    assert_eq!(cancelled.status, HoldStatus::Cancelled);

    let summary = settlement.instructor_summary(&instructor).unwrap();
    assert_eq!(summary.blocked_net, 7_000);
    assert_eq!(summary.pending_net, 0);

    // the sweep after the window finds nothing to release
    h.clock.advance(Duration::days(8));
    let stats = settlement.release_due_holds(100).unwrap();
    assert_eq!(stats.released, 0);

    let ledger = &settlement.ledgers_for_instructor(&instructor).unwrap()[0];
    let err = settlement.settle(&ledger.id).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Integrity(IntegrityError::SettleIneligible(_))
    ));
}

#[tokio::test]
async fn late_refund_rejected() {
    let h = Harness::new();
    let user = h.users.register();
    let (course, _) = h.publish_course(10_000);

    let receipt = h
        .orchestrator()
        .charge(cash_request(user, vec![course], 10_000, "s-4"))
        .await
        .unwrap();
    let order = h.store.get_order(&receipt.order_id).unwrap().unwrap();
    let item_id = order.items[0].id;
    let settlement = h.settlement();

    // window elapsed, sweep not yet run: rejected on the window itself
    h.clock.advance(Duration::days(8));
    let err = settlement.cancel_for_refund(&item_id).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::RefundWindowClosed { .. })
    ));

    // after the sweep released the hold, the same refund loses on staleness
    settlement.release_due_holds(100).unwrap();
    let err = settlement.cancel_for_refund(&item_id).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::RefundWindowClosed { .. })
            | EngineError::Conflict(ConflictError::StaleHold { .. })
    ));
}

#[tokio::test]
async fn refund_and_release_race_ends_in_one_terminal_state() {
    let h = Harness::new();
    let user = h.users.register();
    let (course, instructor) = h.publish_course(10_000);

    let receipt = h
        .orchestrator()
        .charge(cash_request(user, vec![course], 10_000, "s-5"))
        .await
        .unwrap();
    let order = h.store.get_order(&receipt.order_id).unwrap().unwrap();
    let item_id = order.items[0].id;
    let settlement = h.settlement();

    // refund first, then the (late-running) sweep: the hold is Cancelled
    // and stays Cancelled
    settlement.cancel_for_refund(&item_id).unwrap();
    h.clock.advance(Duration::days(8));
    let stats = settlement.release_due_holds(100).unwrap();
    assert_eq!(stats.released, 0);

    let hold = h.store.find_hold_by_item(&item_id).unwrap().unwrap();
    assert_eq!(hold.status, HoldStatus::Cancelled);
    assert_eq!(
        settlement.instructor_summary(&instructor).unwrap().blocked_net,
        7_000
    );
}

#[tokio::test(start_paused = true)]
async fn background_sweeper_releases_due_holds() {
    let h = Harness::new();
    let user = h.users.register();
    let (course, instructor) = h.publish_course(10_000);

    h.orchestrator()
        .charge(cash_request(user, vec![course], 10_000, "s-bg"))
        .await
        .unwrap();
    h.clock.advance(Duration::days(8));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let sweeper = tokio::spawn(coursepay_engine::run_sweeper(
        std::sync::Arc::new(h.settlement()),
        std::sync::Arc::new(h.wallet()),
        h.config.clone(),
        shutdown_rx,
    ));

    // paused time auto-advances past the first interval tick
    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    shutdown_tx.send(true).unwrap();
    sweeper.await.unwrap();

    let summary = h.settlement().instructor_summary(&instructor).unwrap();
    assert_eq!(summary.eligible_net, 7_000);
}

#[tokio::test]
async fn multi_item_orders_settle_per_line() {
    let h = Harness::new();
    let user = h.users.register();
    let (a, instructor_a) = h.publish_course(10_000);
    let (b, instructor_b) = h.publish_course(20_000);

    let receipt = h
        .orchestrator()
        .charge(cash_request(user, vec![a, b], 30_000, "s-6"))
        .await
        .unwrap();
    let order = h.store.get_order(&receipt.order_id).unwrap().unwrap();
    let settlement = h.settlement();

    // refund only the first line; the second still becomes eligible
    settlement.cancel_for_refund(&order.items[0].id).unwrap();
    h.clock.advance(Duration::days(8));
    let stats = settlement.release_due_holds(100).unwrap();
    assert_eq!(stats.released, 1);

    assert_eq!(
        settlement.instructor_summary(&instructor_a).unwrap().blocked_net,
        7_000
    );
    assert_eq!(
        settlement.instructor_summary(&instructor_b).unwrap().eligible_net,
        14_000
    );
}
