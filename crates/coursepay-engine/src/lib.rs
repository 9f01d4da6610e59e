//! Payment and settlement engine for coursepay.
//!
//! Ties the domain model (`coursepay-core`) and storage (`coursepay-store`)
//! together into the operations the platform exposes:
//!
//! - [`PaymentOrchestrator`] — the validate / capture / commit pipeline.
//! - [`SettlementService`] — refund-window sweep, refunds, payouts.
//! - [`CookieWallet`] — wallet balance, grants, debits, expiry.
//! - [`run_sweeper`] — the background task driving time-based transitions.
//!
//! External systems (catalog, user directory, payment gateway, clock) are
//! reached through the traits in [`collaborators`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod collaborators;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod settlement;
pub mod sweeper;
pub mod validate;
pub mod wallet;

pub use collaborators::{
    Clock, CourseCatalog, CourseSummary, FixedClock, GatewayCapture, PaymentGateway, SystemClock,
    UserDirectory,
};
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use orchestrator::{OrderReceipt, PaymentOrchestrator};
pub use settlement::{SettlementService, SweepStats};
pub use sweeper::run_sweeper;
pub use validate::{PaymentRequest, ValidatedPayment, ValidationOutcome};
pub use wallet::CookieWallet;
