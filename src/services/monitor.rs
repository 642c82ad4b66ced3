use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::services::sync_service::SyncEngine;

/// Why a sync attempt is being requested. Redundant triggers are cheap: the
/// engine's own offline gate and mutex turn them into no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    Startup,
    Reconnect,
    Foreground,
    Interval,
    Manual,
}

/// Tracks network reachability and app-foreground visibility, and turns
/// transitions into queued sync requests consumed by one loop.
pub struct ConnectivityMonitor {
    online_tx: watch::Sender<bool>,
    foreground_tx: watch::Sender<bool>,
    trigger_tx: mpsc::Sender<SyncTrigger>,
}

impl ConnectivityMonitor {
    pub fn new(trigger_tx: mpsc::Sender<SyncTrigger>) -> Self {
        Self {
            online_tx: watch::Sender::new(true),
            foreground_tx: watch::Sender::new(true),
            trigger_tx,
        }
    }

    pub fn online_rx(&self) -> watch::Receiver<bool> {
        self.online_tx.subscribe()
    }

    pub fn is_online(&self) -> bool {
        *self.online_tx.borrow()
    }

    pub fn is_foreground(&self) -> bool {
        *self.foreground_tx.borrow()
    }

    /// The user-visible indicator is a pure projection of reachability.
    pub fn status(&self) -> &'static str {
        if self.is_online() { "Online" } else { "Offline" }
    }

    pub fn set_online(&self, online: bool) {
        let was_online = self.is_online();
        self.online_tx.send_replace(online);

        if online && !was_online {
            info!("connection restored - online");
            self.request(SyncTrigger::Reconnect);
        } else if !online && was_online {
            info!("connection lost - working offline");
        }
    }

    pub fn set_foreground(&self, foreground: bool) {
        let was_foreground = self.is_foreground();
        self.foreground_tx.send_replace(foreground);

        if foreground && !was_foreground && self.is_online() {
            info!("app foregrounded while online");
            self.request(SyncTrigger::Foreground);
        }
    }

    /// Fire-and-forget enqueue. A full channel means a run is already due, so
    /// dropping the extra request loses nothing.
    pub fn request(&self, trigger: SyncTrigger) {
        if self.trigger_tx.try_send(trigger).is_err() {
            warn!("sync trigger queue full, dropping {:?}", trigger);
        }
    }
}

/// Consumes sync requests sequentially: queued triggers plus a fixed-period
/// tick. Manual requests always run; everything else respects the auto-sync
/// switch.
pub async fn run(
    engine: Arc<SyncEngine>,
    mut triggers: mpsc::Receiver<SyncTrigger>,
    interval: Duration,
) {
    info!("sync trigger loop started (interval: {:?})", interval);

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The interval's first tick fires immediately; the startup trigger
    // already covers the initial attempt.
    ticker.tick().await;

    loop {
        let trigger = tokio::select! {
            _ = ticker.tick() => SyncTrigger::Interval,
            requested = triggers.recv() => match requested {
                Some(t) => t,
                None => break,
            },
        };

        if trigger != SyncTrigger::Manual && !engine.auto_sync_enabled() {
            continue;
        }

        let report = engine.sync_all().await;
        if report.synced > 0 || report.failed > 0 {
            info!(
                "sync ({:?}): synced {}, failed {}",
                trigger, report.synced, report.failed
            );
        }
    }

    info!("sync trigger loop stopped");
}
