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

//! Broker-facing interface. The transport itself (connection establishment,
//! queue management, acknowledgement wiring, authentication stamping) lives
//! outside this crate; the server only ever sees these traits.

use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("no such queue: {0}")]
    QueueNotFound(String),
    #[error("broker unavailable: {0}")]
    Unavailable(String),
    #[error("session is closed")]
    Closed,
}

/// One message as carried by the broker. `validated_user` is stamped by the
/// broker's own authentication layer on ingress; the server trusts it and
/// never sets it on egress.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub payload: Vec<u8>,
    pub validated_user: Option<String>,
}

impl Envelope {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            validated_user: None,
        }
    }

    pub fn from_user(payload: Vec<u8>, user: &str) -> Self {
        Self {
            payload,
            validated_user: Some(user.to_string()),
        }
    }
}

/// A consumed message plus its acknowledgement handle. Dropping without
/// acking leaves redelivery policy to the broker.
pub struct Delivery {
    pub envelope: Envelope,
    acker: Option<Box<dyn FnOnce() + Send>>,
}

impl Delivery {
    pub fn new(envelope: Envelope, acker: Box<dyn FnOnce() + Send>) -> Self {
        Self {
            envelope,
            acker: Some(acker),
        }
    }

    /// Acknowledge receipt to the broker.
    pub fn ack(mut self) {
        if let Some(acker) = self.acker.take() {
            acker();
        }
    }
}

/// The reaper's view of a client queue: does it exist, and is anyone still
/// reading it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueInfo {
    pub address: String,
    pub consumer_count: usize,
}

pub type ConsumerHandler = Arc<dyn Fn(Delivery) + Send + Sync>;

/// Connection-level handle to the broker, opened with the server's own
/// credentials.
pub trait Bus: Send + Sync {
    fn open_session(&self) -> Result<Box<dyn BusSession>, BusError>;
}

/// A broker session owning one (unbound) producer. A session is not
/// concurrently usable; the session pool serializes access to each one.
pub trait BusSession: Send {
    /// Synchronous send to the given address.
    fn send(&mut self, address: &str, envelope: Envelope) -> Result<(), BusError>;

    /// Attach a consumer to the given address. The handler runs on broker
    /// threads and must not block on application work.
    fn consume(&mut self, address: &str, handler: ConsumerHandler) -> Result<(), BusError>;

    /// Enumerate queues whose address starts with `prefix`.
    fn queue_info(&mut self, prefix: &str) -> Result<Vec<QueueInfo>, BusError>;

    fn close(&mut self);
}
