//! Cookie wallet lifecycle tests.

mod common;

use chrono::Duration;

use common::{cookie_request, Harness};
use coursepay_core::{BatchSource, CookieType, IntegrityError, PaymentMethod, ValidationError};
use coursepay_engine::{Clock, EngineError};
use coursepay_store::Store;

#[tokio::test]
async fn cookie_purchase_spends_free_before_paid() {
    let h = Harness::new();
    let user = h.users.register();
    let (course, _) = h.publish_course(80);
    let wallet = h.wallet();
    let now = h.clock.now();

    // paid credit acquired first, free credit granted later: free still
    // spends first
    let paid = wallet
        .credit(user, CookieType::Paid, BatchSource::Purchase, 40, None)
        .unwrap();
    h.clock.advance(Duration::hours(1));
    let free = wallet
        .credit(
            user,
            CookieType::Free,
            BatchSource::Promotion,
            60,
            Some(now + Duration::days(30)),
        )
        .unwrap();
    assert_eq!(wallet.balance(&user).unwrap(), 100);

    let receipt = h
        .orchestrator()
        .charge(cookie_request(user, vec![course], 80, "w-1"))
        .await
        .unwrap();

    assert_eq!(receipt.wallet_debits, vec![(free.id, 60), (paid.id, 20)]);
    assert_eq!(wallet.balance(&user).unwrap(), 20);

    // the committed order is a cookie order and never touched the gateway
    let order = h.store.get_order(&receipt.order_id).unwrap().unwrap();
    assert_eq!(order.method, PaymentMethod::Cookie);
    assert!(h.gateway.captures.lock().unwrap().is_empty());
}

#[tokio::test]
async fn free_tier_spends_soonest_expiry_first() {
    let h = Harness::new();
    let user = h.users.register();
    let wallet = h.wallet();
    let now = h.clock.now();

    let never = wallet
        .credit(user, CookieType::Free, BatchSource::Admin, 10, None)
        .unwrap();
    let soon = wallet
        .credit(user, CookieType::Free, BatchSource::Promotion, 10, Some(now + Duration::days(1)))
        .unwrap();
    let later = wallet
        .credit(user, CookieType::Free, BatchSource::Promotion, 10, Some(now + Duration::days(7)))
        .unwrap();

    let debits = wallet.debit(&user, 25).unwrap();
    assert_eq!(debits, vec![(soon.id, 10), (later.id, 10), (never.id, 5)]);
}

#[tokio::test]
async fn insufficient_balance_debits_nothing() {
    let h = Harness::new();
    let user = h.users.register();
    let (course, _) = h.publish_course(80);
    let wallet = h.wallet();

    wallet
        .credit(user, CookieType::Paid, BatchSource::Purchase, 50, None)
        .unwrap();

    let err = h
        .orchestrator()
        .charge(cookie_request(user, vec![course], 80, "w-2"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::InsufficientCookies { balance: 50, required: 80 })
    ));

    // no partial debit happened
    assert_eq!(wallet.balance(&user).unwrap(), 50);
    assert!(!h.store.has_paid_purchase(&user, &course).unwrap());
}

#[tokio::test]
async fn expiry_sweep_forfeits_the_remainder() {
    let h = Harness::new();
    let user = h.users.register();
    let wallet = h.wallet();
    let now = h.clock.now();

    let expiring = wallet
        .credit(user, CookieType::Free, BatchSource::Promotion, 30, Some(now + Duration::days(1)))
        .unwrap();
    wallet
        .credit(user, CookieType::Paid, BatchSource::Purchase, 50, None)
        .unwrap();
    wallet.debit(&user, 10).unwrap(); // 20 left on the expiring batch

    h.clock.advance(Duration::days(2));
    assert_eq!(wallet.sweep_expired().unwrap(), 1);
    assert_eq!(wallet.balance(&user).unwrap(), 50);

    // history keeps the forfeited batch for audit
    let history = wallet.history(&user).unwrap();
    let forfeited = history.iter().find(|b| b.id == expiring.id).unwrap();
    assert!(!forfeited.is_active);
    assert_eq!(forfeited.qty_remain, 20);

    // sweep is idempotent
    assert_eq!(wallet.sweep_expired().unwrap(), 0);
}

#[tokio::test]
async fn non_positive_grants_rejected() {
    let h = Harness::new();
    let user = h.users.register();
    let wallet = h.wallet();

    let err = wallet
        .credit(user, CookieType::Free, BatchSource::Admin, 0, None)
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Integrity(IntegrityError::NegativeAmount(0))
    ));
}

#[tokio::test]
async fn daily_cookie_limit_enforced() {
    let config = coursepay_engine::EngineConfig {
        daily_cookie_cap: 100,
        ..coursepay_engine::EngineConfig::default()
    };
    let h = Harness::with_config(config);
    let user = h.users.register();
    let (a, _) = h.publish_course(80);
    let (b, _) = h.publish_course(40);
    let wallet = h.wallet();

    wallet
        .credit(user, CookieType::Paid, BatchSource::Purchase, 200, None)
        .unwrap();
    let orch = h.orchestrator();

    orch.charge(cookie_request(user, vec![a], 80, "w-3a"))
        .await
        .unwrap();

    let err = orch
        .charge(cookie_request(user, vec![b], 40, "w-3b"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::DailyCookieLimitExceeded {
            spent: 80,
            requested: 40,
            cap: 100,
        })
    ));
}
