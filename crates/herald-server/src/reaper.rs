// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Periodic reconciliation of registered subscriptions against live broker
//! queues. Client queues vanish entirely on clean shutdown and linger
//! consumer-less after crashes; both shapes must free server-side
//! subscriptions. Polling is used rather than broker push notifications for
//! portability across broker versions.

use crate::session_pool::SessionPool;
use crate::subscriptions::SubscriptionRegistry;
use herald_common::RPC_CLIENT_QUEUE_PREFIX;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info, warn};

pub(crate) struct ReaperHandle {
    shutdown: flume::Sender<()>,
    thread: JoinHandle<()>,
}

impl ReaperHandle {
    pub fn stop(self) {
        let _ = self.shutdown.send(());
        if self.thread.join().is_err() {
            error!("reaper thread panicked");
        }
    }
}

pub(crate) fn start(
    registry: Arc<SubscriptionRegistry>,
    pool: Arc<SessionPool>,
    interval: Duration,
) -> eyre::Result<ReaperHandle> {
    let (shutdown_tx, shutdown_rx) = flume::bounded(1);
    let thread = std::thread::Builder::new()
        .name("herald-reaper".to_string())
        .spawn(move || loop {
            match shutdown_rx.recv_timeout(interval) {
                Err(flume::RecvTimeoutError::Timeout) => reap_pass(&registry, &pool),
                Ok(()) | Err(flume::RecvTimeoutError::Disconnected) => return,
            }
        })?;
    Ok(ReaperHandle {
        shutdown: shutdown_tx,
        thread,
    })
}

/// One reconciliation pass: subscriptions whose client queue no longer
/// exists (undeployed) or exists with no readers (abandoned) are
/// unsubscribed.
pub(crate) fn reap_pass(registry: &SubscriptionRegistry, pool: &SessionPool) {
    let snapshot = registry.snapshot();
    if snapshot.is_empty() {
        return;
    }

    let queues = match pool.with_any(|session| session.queue_info(RPC_CLIENT_QUEUE_PREFIX)) {
        Ok(Ok(queues)) => queues,
        Ok(Err(e)) => {
            warn!(error = ?e, "reaper unable to query broker queues; skipping pass");
            return;
        }
        Err(e) => {
            warn!(error = ?e, "reaper unable to claim a session; skipping pass");
            return;
        }
    };

    let deployed: HashSet<&str> = queues.iter().map(|q| q.address.as_str()).collect();
    let dead: HashSet<&str> = queues
        .iter()
        .filter(|q| q.consumer_count == 0)
        .map(|q| q.address.as_str())
        .collect();

    let mut undeployed = Vec::new();
    let mut abandoned = Vec::new();
    for (addr, ids) in &snapshot {
        if !deployed.contains(addr.as_str()) {
            undeployed.extend(ids.iter().copied());
        } else if dead.contains(addr.as_str()) {
            abandoned.extend(ids.iter().copied());
        }
    }

    if !undeployed.is_empty() {
        info!(
            count = undeployed.len(),
            "unsubscribing observations for undeployed client queues"
        );
        registry.invalidate(&undeployed);
    }
    if !abandoned.is_empty() {
        info!(
            count = abandoned.len(),
            "unsubscribing observations for abandoned client queues"
        );
        registry.invalidate(&abandoned);
    }
    registry.cleanup();
}
