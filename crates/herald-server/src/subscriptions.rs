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

//! Live observation subscriptions, owned exclusively here. The registry is
//! the single invariant-preserving point: every removal path, explicit or
//! bulk, runs the record's cancel-handle, and the handle itself guarantees
//! at-most-once semantics.

use herald_common::{ClientAddress, ObservationId, Subscription};
use itertools::Itertools;
use std::collections::HashMap;
use tracing::{trace, warn};

pub struct SubscriptionRecord {
    pub client_addr: ClientAddress,
    pub handle: Subscription,
}

pub struct SubscriptionRegistry {
    subscriptions: papaya::HashMap<ObservationId, SubscriptionRecord>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            subscriptions: papaya::HashMap::new(),
        }
    }

    pub fn insert(&self, id: ObservationId, record: SubscriptionRecord) {
        let guard = self.subscriptions.guard();
        if let Some(prior) = self.subscriptions.insert(id, record, &guard) {
            // Random 63-bit ids should never collide; if one does, the old
            // record must still not leak its subscription.
            warn!(id = %id, "duplicate observation id registered; cancelling prior subscription");
            prior.handle.cancel();
        }
    }

    /// Cancel and remove the given ids. Unknown ids are ignored, so the
    /// operation is idempotent.
    pub fn invalidate(&self, ids: &[ObservationId]) {
        let guard = self.subscriptions.guard();
        for id in ids {
            if let Some(record) = self.subscriptions.remove(id, &guard) {
                record.handle.cancel();
                trace!(id = %id, client = %record.client_addr, "observation unsubscribed");
            }
        }
    }

    pub fn invalidate_all(&self) {
        let ids: Vec<_> = {
            let guard = self.subscriptions.guard();
            self.subscriptions.iter(&guard).map(|(id, _)| *id).collect()
        };
        self.invalidate(&ids);
    }

    /// Weakly-consistent view grouped by client address, for the reaper's
    /// reconciliation against live broker queues.
    pub fn snapshot(&self) -> HashMap<ClientAddress, Vec<ObservationId>> {
        let guard = self.subscriptions.guard();
        self.subscriptions
            .iter(&guard)
            .map(|(id, record)| (record.client_addr.clone(), *id))
            .into_group_map()
    }

    /// Advisory housekeeping hook. All removal paths here are synchronous,
    /// so there is nothing deferred to drain.
    pub fn cleanup(&self) {
        trace!(live = self.subscriptions.len(), "registry cleanup pass");
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counted_record(addr: &str, cancels: &Arc<AtomicUsize>) -> SubscriptionRecord {
        let cancels = cancels.clone();
        SubscriptionRecord {
            client_addr: ClientAddress(addr.to_string()),
            handle: Subscription::new(
                Arc::new(AtomicBool::new(true)),
                Box::new(move || {
                    cancels.fetch_add(1, Ordering::SeqCst);
                }),
            ),
        }
    }

    #[test]
    fn invalidate_fires_the_cancel_handle_exactly_once() {
        let registry = SubscriptionRegistry::new();
        let cancels = Arc::new(AtomicUsize::new(0));
        let id = ObservationId(1);
        registry.insert(id, counted_record("q1", &cancels));

        registry.invalidate(&[id]);
        registry.invalidate(&[id]);
        assert_eq!(cancels.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn invalidating_unknown_ids_is_a_noop() {
        let registry = SubscriptionRegistry::new();
        let cancels = Arc::new(AtomicUsize::new(0));
        registry.insert(ObservationId(1), counted_record("q1", &cancels));

        registry.invalidate(&[ObservationId(99), ObservationId(100)]);
        assert_eq!(registry.len(), 1);
        assert_eq!(cancels.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn invalidate_all_cancels_everything() {
        let registry = SubscriptionRegistry::new();
        let cancels = Arc::new(AtomicUsize::new(0));
        for i in 0..5 {
            registry.insert(ObservationId(i), counted_record("q1", &cancels));
        }
        registry.invalidate_all();
        assert_eq!(cancels.load(Ordering::SeqCst), 5);
        assert!(registry.is_empty());
    }

    #[test]
    fn snapshot_groups_by_client_address() {
        let registry = SubscriptionRegistry::new();
        let cancels = Arc::new(AtomicUsize::new(0));
        registry.insert(ObservationId(1), counted_record("q1", &cancels));
        registry.insert(ObservationId(2), counted_record("q1", &cancels));
        registry.insert(ObservationId(3), counted_record("q2", &cancels));

        let snapshot = registry.snapshot();
        let mut q1 = snapshot
            .get(&ClientAddress("q1".to_string()))
            .unwrap()
            .clone();
        q1.sort();
        assert_eq!(q1, vec![ObservationId(1), ObservationId(2)]);
        assert_eq!(
            snapshot.get(&ClientAddress("q2".to_string())).unwrap(),
            &vec![ObservationId(3)]
        );
    }

    #[test]
    fn duplicate_insert_cancels_the_prior_record() {
        let registry = SubscriptionRegistry::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let id = ObservationId(7);
        registry.insert(id, counted_record("q1", &first));
        registry.insert(id, counted_record("q1", &second));

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
        assert_eq!(registry.len(), 1);
    }
}
