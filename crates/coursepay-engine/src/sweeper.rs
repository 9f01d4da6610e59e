//! Background sweep loop.
//!
//! One periodic task drives both time-based transitions: releasing
//! settlement holds whose refund window elapsed, and deactivating expired
//! cookie batches. Both underlying operations are idempotent, so a crashed
//! or doubled-up sweeper never corrupts state.

use std::sync::Arc;

use tokio::sync::watch;

use crate::config::EngineConfig;
use crate::settlement::SettlementService;
use crate::wallet::CookieWallet;

/// Run the sweep loop until `shutdown` flips to `true`.
///
/// Errors inside a pass are logged and the loop keeps going; a transient
/// storage failure should not stop future sweeps.
pub async fn run_sweeper(
    settlement: Arc<SettlementService>,
    wallet: Arc<CookieWallet>,
    config: EngineConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let period = std::time::Duration::from_secs(config.sweep_interval_seconds);
    let mut ticker = tokio::time::interval(period);
    tracing::info!(interval_secs = config.sweep_interval_seconds, "sweeper started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = settlement.release_due_holds(config.sweep_batch_size) {
                    tracing::error!(error = %err, "hold sweep pass failed");
                }
                if let Err(err) = wallet.sweep_expired() {
                    tracing::error!(error = %err, "batch expiry sweep failed");
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    tracing::info!("sweeper stopping");
                    return;
                }
            }
        }
    }
}
