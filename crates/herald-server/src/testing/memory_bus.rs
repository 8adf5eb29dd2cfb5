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

//! In-memory broker for tests: named queues, round-robin delivery to
//! consumers, a backlog for reader-less queues, and enough introspection to
//! assert on delivery order, stickiness, and acknowledgement counts.

use crate::bus::{Bus, BusError, BusSession, ConsumerHandler, Delivery, Envelope, QueueInfo};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// One message as observed on a queue, tagged with the sending session so
/// tests can assert sticky delivery.
#[derive(Clone)]
pub struct DeliveryRecord {
    pub session_id: u64,
    pub envelope: Envelope,
}

struct ConsumerEntry {
    session_id: u64,
    handler: ConsumerHandler,
}

#[derive(Default)]
struct QueueState {
    consumers: Vec<ConsumerEntry>,
    backlog: VecDeque<Envelope>,
    delivered: Vec<DeliveryRecord>,
    next_consumer: usize,
}

#[derive(Default)]
struct BusState {
    queues: HashMap<String, QueueState>,
}

struct BusInner {
    state: Mutex<BusState>,
    next_session_id: AtomicU64,
    open_sessions: AtomicUsize,
    acks: AtomicUsize,
}

pub struct MemoryBus {
    inner: Arc<BusInner>,
}

impl MemoryBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(BusInner {
                state: Mutex::new(BusState::default()),
                next_session_id: AtomicU64::new(0),
                open_sessions: AtomicUsize::new(0),
                acks: AtomicUsize::new(0),
            }),
        })
    }

    pub fn create_queue(&self, address: &str) {
        self.inner
            .state
            .lock()
            .queues
            .entry(address.to_string())
            .or_default();
    }

    /// Remove the queue entirely: the undeployed shape a clean client
    /// shutdown leaves behind.
    pub fn delete_queue(&self, address: &str) {
        self.inner.state.lock().queues.remove(address);
    }

    /// Keep the queue deployed but drop all its readers: the abandoned shape
    /// a crashed client leaves behind.
    pub fn detach_consumers(&self, address: &str) {
        if let Some(queue) = self.inner.state.lock().queues.get_mut(address) {
            queue.consumers.clear();
        }
    }

    pub fn delivered(&self, address: &str) -> Vec<DeliveryRecord> {
        self.inner
            .state
            .lock()
            .queues
            .get(address)
            .map(|q| q.delivered.clone())
            .unwrap_or_default()
    }

    pub fn ack_count(&self) -> usize {
        self.inner.acks.load(Ordering::SeqCst)
    }

    pub fn open_sessions(&self) -> usize {
        self.inner.open_sessions.load(Ordering::SeqCst)
    }
}

impl Bus for MemoryBus {
    fn open_session(&self) -> Result<Box<dyn BusSession>, BusError> {
        let id = self.inner.next_session_id.fetch_add(1, Ordering::SeqCst);
        self.inner.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            id,
            inner: self.inner.clone(),
            open: true,
        }))
    }
}

struct MemorySession {
    id: u64,
    inner: Arc<BusInner>,
    open: bool,
}

impl MemorySession {
    fn make_delivery(inner: &Arc<BusInner>, envelope: Envelope) -> Delivery {
        let acks = inner.clone();
        Delivery::new(
            envelope,
            Box::new(move || {
                acks.acks.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }
}

impl BusSession for MemorySession {
    fn send(&mut self, address: &str, envelope: Envelope) -> Result<(), BusError> {
        if !self.open {
            return Err(BusError::Closed);
        }
        // Pick the consumer under the lock, invoke it outside: handlers run
        // arbitrary application code and may send on other sessions.
        let handoff = {
            let mut state = self.inner.state.lock();
            let Some(queue) = state.queues.get_mut(address) else {
                return Err(BusError::QueueNotFound(address.to_string()));
            };
            queue.delivered.push(DeliveryRecord {
                session_id: self.id,
                envelope: envelope.clone(),
            });
            if queue.consumers.is_empty() {
                queue.backlog.push_back(envelope.clone());
                None
            } else {
                let index = queue.next_consumer % queue.consumers.len();
                queue.next_consumer = queue.next_consumer.wrapping_add(1);
                Some(queue.consumers[index].handler.clone())
            }
        };
        if let Some(handler) = handoff {
            handler(Self::make_delivery(&self.inner, envelope));
        }
        Ok(())
    }

    fn consume(&mut self, address: &str, handler: ConsumerHandler) -> Result<(), BusError> {
        if !self.open {
            return Err(BusError::Closed);
        }
        let drained = {
            let mut state = self.inner.state.lock();
            let queue = state.queues.entry(address.to_string()).or_default();
            queue.consumers.push(ConsumerEntry {
                session_id: self.id,
                handler: handler.clone(),
            });
            queue.backlog.drain(..).collect::<Vec<_>>()
        };
        for envelope in drained {
            handler(Self::make_delivery(&self.inner, envelope));
        }
        Ok(())
    }

    fn queue_info(&mut self, prefix: &str) -> Result<Vec<QueueInfo>, BusError> {
        if !self.open {
            return Err(BusError::Closed);
        }
        Ok(self
            .inner
            .state
            .lock()
            .queues
            .iter()
            .filter(|(address, _)| address.starts_with(prefix))
            .map(|(address, queue)| QueueInfo {
                address: address.clone(),
                consumer_count: queue.consumers.len(),
            })
            .collect())
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        self.inner.open_sessions.fetch_sub(1, Ordering::SeqCst);
        let mut state = self.inner.state.lock();
        for queue in state.queues.values_mut() {
            queue.consumers.retain(|c| c.session_id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn capture_handler(into: &Arc<StdMutex<Vec<Vec<u8>>>>) -> ConsumerHandler {
        let into = into.clone();
        Arc::new(move |delivery: Delivery| {
            into.lock().unwrap().push(delivery.envelope.payload.clone());
            delivery.ack();
        })
    }

    #[test]
    fn sends_reach_the_attached_consumer_and_get_acked() {
        let bus = MemoryBus::new();
        bus.create_queue("q");
        let seen = Arc::new(StdMutex::new(Vec::new()));

        let mut consumer = bus.open_session().unwrap();
        consumer.consume("q", capture_handler(&seen)).unwrap();

        let mut producer = bus.open_session().unwrap();
        producer.send("q", Envelope::new(vec![1, 2, 3])).unwrap();

        assert_eq!(seen.lock().unwrap().as_slice(), &[vec![1, 2, 3]]);
        assert_eq!(bus.ack_count(), 1);
        assert_eq!(bus.delivered("q").len(), 1);
    }

    #[test]
    fn backlogged_messages_drain_to_a_late_consumer() {
        let bus = MemoryBus::new();
        bus.create_queue("q");
        let mut producer = bus.open_session().unwrap();
        producer.send("q", Envelope::new(vec![1])).unwrap();
        producer.send("q", Envelope::new(vec![2])).unwrap();

        let seen = Arc::new(StdMutex::new(Vec::new()));
        let mut consumer = bus.open_session().unwrap();
        consumer.consume("q", capture_handler(&seen)).unwrap();
        assert_eq!(seen.lock().unwrap().as_slice(), &[vec![1], vec![2]]);
    }

    #[test]
    fn sends_to_missing_queues_fail() {
        let bus = MemoryBus::new();
        let mut producer = bus.open_session().unwrap();
        assert_eq!(
            producer.send("nowhere", Envelope::new(vec![])),
            Err(BusError::QueueNotFound("nowhere".to_string()))
        );
    }

    #[test]
    fn queue_info_reports_consumer_counts_by_prefix() {
        let bus = MemoryBus::new();
        bus.create_queue("client.a");
        bus.create_queue("client.b");
        bus.create_queue("server");

        let seen = Arc::new(StdMutex::new(Vec::new()));
        let mut consumer = bus.open_session().unwrap();
        consumer.consume("client.a", capture_handler(&seen)).unwrap();

        let mut probe = bus.open_session().unwrap();
        let mut info = probe.queue_info("client.").unwrap();
        info.sort_by(|a, b| a.address.cmp(&b.address));
        assert_eq!(
            info,
            vec![
                QueueInfo {
                    address: "client.a".to_string(),
                    consumer_count: 1
                },
                QueueInfo {
                    address: "client.b".to_string(),
                    consumer_count: 0
                },
            ]
        );
    }

    #[test]
    fn closing_a_session_detaches_its_consumers() {
        let bus = MemoryBus::new();
        bus.create_queue("q");
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let mut consumer = bus.open_session().unwrap();
        consumer.consume("q", capture_handler(&seen)).unwrap();
        assert_eq!(bus.open_sessions(), 1);

        consumer.close();
        assert_eq!(bus.open_sessions(), 0);

        let mut producer = bus.open_session().unwrap();
        producer.send("q", Envelope::new(vec![9])).unwrap();
        // Nobody reading anymore; the message backlogs.
        assert!(seen.lock().unwrap().is_empty());
    }
}
