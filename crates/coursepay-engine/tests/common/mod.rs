//! Shared test harness: in-memory collaborators around a real store.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;

use coursepay_core::{CourseId, InstructorId, UserId};
use coursepay_engine::{
    CookieWallet, CourseCatalog, CourseSummary, EngineConfig, FixedClock, GatewayCapture,
    PaymentGateway, PaymentOrchestrator, PaymentRequest, SettlementService, UserDirectory,
};
use coursepay_store::RocksStore;

/// Catalog fake backed by a map.
#[derive(Default)]
pub struct FakeCatalog {
    courses: Mutex<HashMap<CourseId, CourseSummary>>,
}

impl FakeCatalog {
    pub fn insert(&self, course_id: CourseId, summary: CourseSummary) {
        self.courses.lock().unwrap().insert(course_id, summary);
    }
}

impl CourseCatalog for FakeCatalog {
    fn get_course(&self, course_id: &CourseId) -> Option<CourseSummary> {
        self.courses.lock().unwrap().get(course_id).copied()
    }
}

/// User directory fake backed by a set.
#[derive(Default)]
pub struct FakeUsers {
    users: Mutex<HashSet<UserId>>,
}

impl FakeUsers {
    pub fn register(&self) -> UserId {
        let id = UserId::generate();
        self.users.lock().unwrap().insert(id);
        id
    }
}

impl UserDirectory for FakeUsers {
    fn exists(&self, user_id: &UserId) -> bool {
        self.users.lock().unwrap().contains(user_id)
    }
}

/// Gateway fake recording captures and refunds.
#[derive(Default)]
pub struct FakeGateway {
    counter: AtomicU64,
    pub captures: Mutex<Vec<GatewayCapture>>,
    pub refunds: Mutex<Vec<(String, i64)>>,
    pub decline_with: Mutex<Option<String>>,
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn capture(
        &self,
        _user_id: &UserId,
        amount: i64,
        _idempotency_key: &str,
    ) -> Result<GatewayCapture, String> {
        if let Some(reason) = self.decline_with.lock().unwrap().take() {
            return Err(reason);
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let capture = GatewayCapture {
            reference: format!("cap-{n}"),
            amount,
        };
        self.captures.lock().unwrap().push(capture.clone());
        Ok(capture)
    }

    async fn refund(&self, reference: &str, amount: i64) -> Result<(), String> {
        self.refunds.lock().unwrap().push((reference.to_string(), amount));
        Ok(())
    }
}

static TRACING: Once = Once::new();

/// Route engine logs through the test writer; `RUST_LOG` controls verbosity.
fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Everything a test needs, wired over one temp-dir store.
pub struct Harness {
    pub store: Arc<RocksStore>,
    pub catalog: Arc<FakeCatalog>,
    pub users: Arc<FakeUsers>,
    pub gateway: Arc<FakeGateway>,
    pub clock: Arc<FixedClock>,
    pub config: EngineConfig,
    _dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        init_tracing();
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        Self {
            store,
            catalog: Arc::new(FakeCatalog::default()),
            users: Arc::new(FakeUsers::default()),
            gateway: Arc::new(FakeGateway::default()),
            clock: Arc::new(FixedClock::at(Utc::now())),
            config,
            _dir: dir,
        }
    }

    pub fn orchestrator(&self) -> PaymentOrchestrator {
        PaymentOrchestrator::new(
            self.store.clone(),
            self.catalog.clone(),
            self.users.clone(),
            self.gateway.clone(),
            self.clock.clone(),
            self.config.clone(),
        )
    }

    pub fn settlement(&self) -> SettlementService {
        SettlementService::new(self.store.clone(), self.clock.clone())
    }

    pub fn wallet(&self) -> CookieWallet {
        CookieWallet::new(self.store.clone(), self.clock.clone())
    }

    /// Publish a course and return its IDs.
    pub fn publish_course(&self, price: i64) -> (CourseId, InstructorId) {
        let course_id = CourseId::generate();
        let instructor_id = InstructorId::generate();
        self.catalog.insert(
            course_id,
            CourseSummary {
                instructor_id,
                price,
                is_published: true,
            },
        );
        (course_id, instructor_id)
    }
}

/// A cash request for the given courses.
pub fn cash_request(
    user_id: UserId,
    course_ids: Vec<CourseId>,
    declared_total: i64,
    idempotency_key: &str,
) -> PaymentRequest {
    PaymentRequest {
        user_id,
        course_ids,
        coupon: None,
        cookie_amount: 0,
        declared_total,
        idempotency_key: idempotency_key.to_string(),
    }
}

/// A wallet-paid request (cookie amount covers the whole total).
pub fn cookie_request(
    user_id: UserId,
    course_ids: Vec<CourseId>,
    declared_total: i64,
    idempotency_key: &str,
) -> PaymentRequest {
    PaymentRequest {
        user_id,
        course_ids,
        coupon: None,
        cookie_amount: declared_total,
        declared_total,
        idempotency_key: idempotency_key.to_string(),
    }
}
