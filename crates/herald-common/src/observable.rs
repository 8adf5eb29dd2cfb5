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

//! Observation streams: lazy, possibly-infinite sequences of values pushed
//! to subscribers, terminated by completion or error. Host methods hand
//! these back inside reply values; the server subscribes to them during
//! reply encoding and forwards every emission to the originating client.

use crate::messages::Notification;
use crate::var::Value;
use crate::RpcError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receives materialized emissions from a stream. Terminal notifications
/// (`Completed`, `Error`) are final; nothing follows them.
pub trait Observer: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// A subscribable stream of values.
pub trait Observable: Send + Sync {
    fn subscribe(&self, observer: Arc<dyn Observer>) -> Subscription;
}

/// Cancel-handle for one subscription. Cancellation is idempotent: the
/// shared `active` flag flips at most once and the detach closure runs at
/// most once, whichever path gets there first.
pub struct Subscription {
    active: Arc<AtomicBool>,
    detach: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    pub fn new(active: Arc<AtomicBool>, detach: Box<dyn FnOnce() + Send>) -> Self {
        Self {
            active,
            detach: Mutex::new(Some(detach)),
        }
    }

    /// A subscription that was never live, e.g. on an already-terminated
    /// source.
    pub fn terminated() -> Self {
        Self {
            active: Arc::new(AtomicBool::new(false)),
            detach: Mutex::new(None),
        }
    }

    pub fn cancel(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            if let Some(detach) = self.detach.lock().take() {
                detach();
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// The flag shared with whoever delivers emissions, so delivery code can
    /// observe cancellation without holding the subscription itself.
    pub fn active_flag(&self) -> Arc<AtomicBool> {
        self.active.clone()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // A dropped handle is as good as a cancelled one; nobody can cancel
        // it anymore, so the source must not keep delivering.
        self.cancel();
    }
}

struct SubjectEntry {
    active: Arc<AtomicBool>,
    observer: Arc<dyn Observer>,
}

struct SubjectState {
    subscribers: Vec<SubjectEntry>,
    terminal: Option<Notification>,
}

/// Push-style `Observable`: values pushed into the subject fan out to every
/// live subscriber in push order. Terminal states latch; a terminated
/// subject ignores further pushes, and late subscribers receive the terminal
/// notification immediately.
///
/// Emissions are delivered under the subject lock to keep per-subscriber
/// ordering strict, so observer callbacks must not re-enter the subject.
pub struct Subject {
    state: Mutex<SubjectState>,
}

impl Subject {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SubjectState {
                subscribers: Vec::new(),
                terminal: None,
            }),
        })
    }

    pub fn push(&self, value: Value) {
        let mut state = self.state.lock();
        if state.terminal.is_some() {
            return;
        }
        state
            .subscribers
            .retain(|entry| entry.active.load(Ordering::SeqCst));
        for entry in &state.subscribers {
            entry.observer.notify(Notification::Next(value.clone()));
        }
    }

    pub fn error(&self, error: RpcError) {
        self.terminate(Notification::Error(error));
    }

    pub fn complete(&self) {
        self.terminate(Notification::Completed);
    }

    fn terminate(&self, notification: Notification) {
        let mut state = self.state.lock();
        if state.terminal.is_some() {
            return;
        }
        state.terminal = Some(notification.clone());
        for entry in &state.subscribers {
            if entry.active.load(Ordering::SeqCst) {
                entry.observer.notify(notification.clone());
            }
        }
        state.subscribers.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        let mut state = self.state.lock();
        state
            .subscribers
            .retain(|entry| entry.active.load(Ordering::SeqCst));
        state.subscribers.len()
    }
}

impl Observable for Subject {
    fn subscribe(&self, observer: Arc<dyn Observer>) -> Subscription {
        let mut state = self.state.lock();
        if let Some(terminal) = &state.terminal {
            observer.notify(terminal.clone());
            return Subscription::terminated();
        }
        let active = Arc::new(AtomicBool::new(true));
        state.subscribers.push(SubjectEntry {
            active: active.clone(),
            observer,
        });
        Subscription::new(active, Box::new(|| {}))
    }
}
