//! Persisting pass results and the background resync loop

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info};

use crate::address::{Address, AddressApi};
use crate::events::{log_event, ControllerKind, ControllerReason};

use super::{AddressController, ControllerError};

/// Timing of the background loop
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// How often the address set is checked (seconds)
    pub check_interval_secs: u64,
    /// Longest time between two full passes (seconds)
    pub resync_interval_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 30,
            resync_interval_secs: 300,
        }
    }
}

impl AddressController {
    /// Run one pass over `addresses` and replace every address whose value
    /// changed. Returns how many were replaced.
    pub async fn on_update(
        &self,
        api: &dyn AddressApi,
        addresses: Vec<Address>,
    ) -> Result<usize, ControllerError> {
        let before: BTreeMap<String, Address> = addresses
            .iter()
            .map(|a| (a.name().to_string(), a.clone()))
            .collect();

        let after = self.reconcile(addresses).await?;

        let mut replaced = 0;
        for address in &after {
            if before.get(address.name()) == Some(address) {
                continue;
            }
            match api.replace_address(address).await {
                Ok(()) => replaced += 1,
                Err(e) => log_event(
                    ControllerReason::AddressSyncFailed,
                    ControllerKind::Address,
                    address.name(),
                    &e.to_string(),
                ),
            }
        }
        debug!("Replaced {} of {} addresses", replaced, after.len());
        Ok(replaced)
    }
}

/// Whether a check tick should run a pass.
///
/// A pass runs when the address set changed since the last pass, while any
/// live address is still settling, or once the resync period is due.
pub fn needs_pass(current: &[Address], last: Option<&[Address]>, resync_due: bool) -> bool {
    if resync_due {
        return true;
    }
    let Some(last) = last else {
        return true;
    };
    if current != last {
        return true;
    }
    current
        .iter()
        .any(|a| a.is_deleted() || !a.status.ready)
}

/// Spawn the controller loop for one tenant as a background task
pub fn spawn_controller(
    controller: Arc<AddressController>,
    api: Arc<dyn AddressApi>,
    config: RunnerConfig,
) -> watch::Sender<()> {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(());

    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(config.check_interval_secs.max(1)));
        let resync = Duration::from_secs(config.resync_interval_secs);
        let mut last_seen: Option<Vec<Address>> = None;
        let mut last_pass: Option<Instant> = None;

        info!(
            "Address controller for {} started, checking every {}s",
            controller.address_space(),
            config.check_interval_secs
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let addresses = match api.list_addresses(controller.address_space()).await {
                        Ok(addresses) => addresses,
                        Err(e) => {
                            error!("{}", ControllerError::ListAddresses(e));
                            continue;
                        }
                    };

                    let resync_due = last_pass.map(|t| t.elapsed() >= resync).unwrap_or(true);
                    if !needs_pass(&addresses, last_seen.as_deref(), resync_due) {
                        continue;
                    }

                    match controller.on_update(api.as_ref(), addresses).await {
                        Ok(_) => {
                            last_pass = Some(Instant::now());
                            last_seen = api.list_addresses(controller.address_space()).await.ok();
                        }
                        Err(e) => error!("Reconciliation of {} failed: {}", controller.address_space(), e),
                    }
                }
                _ = shutdown_rx.changed() => {
                    info!("Address controller for {} shutting down", controller.address_space());
                    break;
                }
            }
        }
    });

    shutdown_tx
}
