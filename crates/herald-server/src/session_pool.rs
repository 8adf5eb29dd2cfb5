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

//! Bounded pool of broker sessions. Sessions are created lazily on first
//! claim and each slot is serialized by its own mutex, so a claimed session
//! is never touched by two threads at once.

use crate::bus::{Bus, BusError, BusSession};
use herald_common::RequestId;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("broker unavailable: {0}")]
    BrokerUnavailable(BusError),
    #[error("session pool is closed")]
    Closed,
}

pub struct SessionPool {
    bus: Arc<dyn Bus>,
    slots: Vec<Mutex<Option<Box<dyn BusSession>>>>,
    next_anonymous: AtomicUsize,
    closed: AtomicBool,
}

impl SessionPool {
    pub fn new(bus: Arc<dyn Bus>, bound: usize) -> Self {
        assert!(bound > 0, "session pool bound must be positive");
        Self {
            bus,
            slots: (0..bound).map(|_| Mutex::new(None)).collect(),
            next_anonymous: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Claim the slot affinitized to `key`. The same key always lands on the
    /// same slot, which keeps everything sent for one request (the reply and
    /// all its observations) FIFO on one session. More concurrent keys than
    /// slots simply share a slot and serialize on its mutex.
    pub fn with_sticky<R>(
        &self,
        key: RequestId,
        f: impl FnOnce(&mut dyn BusSession) -> R,
    ) -> Result<R, PoolError> {
        let slot = (key.0 % self.slots.len() as u64) as usize;
        self.claim(slot, f)
    }

    /// Claim any slot; for callers with no affinity requirement (the
    /// reaper's broker queries).
    pub fn with_any<R>(&self, f: impl FnOnce(&mut dyn BusSession) -> R) -> Result<R, PoolError> {
        let slot = self.next_anonymous.fetch_add(1, Ordering::Relaxed) % self.slots.len();
        self.claim(slot, f)
    }

    fn claim<R>(
        &self,
        index: usize,
        f: impl FnOnce(&mut dyn BusSession) -> R,
    ) -> Result<R, PoolError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PoolError::Closed);
        }
        let mut slot = self.slots[index].lock();
        // Re-check under the slot lock so close() cannot race a fresh
        // session into a drained pool.
        if self.closed.load(Ordering::SeqCst) {
            return Err(PoolError::Closed);
        }
        if slot.is_none() {
            let session = self
                .bus
                .open_session()
                .map_err(PoolError::BrokerUnavailable)?;
            *slot = Some(session);
        }
        let Some(session) = slot.as_mut() else {
            unreachable!("slot populated above");
        };
        Ok(f(session.as_mut()))
    }

    /// Close every open session and refuse further claims.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for slot in &self.slots {
            if let Some(mut session) = slot.lock().take() {
                session.close();
            }
        }
    }
}
