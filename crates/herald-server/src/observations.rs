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

//! The outbound observation path: streams are captured while a reply (or an
//! earlier observation) is being encoded, and every subsequent emission is
//! forwarded to the originating client from one strictly-ordered sender.

use crate::bus::Envelope;
use crate::executor::Executor;
use crate::session_pool::SessionPool;
use crate::subscriptions::{SubscriptionRecord, SubscriptionRegistry};
use bincode::error::EncodeError;
use herald_common::codec::{self, StreamSink};
use herald_common::{
    ClientAddress, Notification, Observable, ObservationId, Observer, RequestId, ServerToClient,
    Subscription,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, trace};

/// One queued emission, bound for the client that owns the subscription.
pub struct ObservationTask {
    pub id: ObservationId,
    pub request_id: RequestId,
    pub client_addr: ClientAddress,
    pub active: Arc<AtomicBool>,
    pub body: Notification,
}

/// Single-threaded sender for all outbound observations. One thread plus
/// sticky sessions is what preserves per-stream FIFO toward the client;
/// distinct streams may interleave arbitrarily.
pub struct ObservationSender {
    exec: Executor,
    pool: Arc<SessionPool>,
    registry: Arc<SubscriptionRegistry>,
}

impl ObservationSender {
    pub fn new(pool: Arc<SessionPool>, registry: Arc<SubscriptionRegistry>) -> Arc<Self> {
        Arc::new(Self {
            exec: Executor::new("herald-obs-send", 1),
            pool,
            registry,
        })
    }

    pub fn forward(self: &Arc<Self>, task: ObservationTask) {
        let sender = self.clone();
        let submitted = self.exec.submit(Box::new(move || {
            sender.send_observation(task);
        }));
        if submitted.is_err() {
            trace!("observation dropped after sender shutdown");
        }
    }

    fn send_observation(self: &Arc<Self>, task: ObservationTask) {
        // The subscription may have been invalidated between emission and
        // this task running; deliver nothing in that case.
        if !task.active.load(Ordering::SeqCst) {
            trace!(id = %task.id, "skipping emission for cancelled subscription");
            return;
        }

        let message = ServerToClient::Observation {
            id: task.id,
            body: task.body,
        };
        // A fresh capture context for this message: emissions that themselves
        // carry streams register them against the same request and client.
        let sink = StreamCapture::new(
            task.request_id,
            task.client_addr.clone(),
            self.registry.clone(),
            self.clone(),
        );
        let bytes = match codec::encode_with_sink(&message, sink) {
            Ok(bytes) => bytes,
            Err(e) => {
                // Per-message fault; the stream itself stays subscribed.
                error!(error = ?e, id = %task.id, "unable to encode observation; dropping emission");
                return;
            }
        };

        let sent = self.pool.with_sticky(task.request_id, |session| {
            session.send(task.client_addr.as_str(), Envelope::new(bytes))
        });
        match sent {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(error = ?e, id = %task.id, client = %task.client_addr,
                       "unable to deliver observation; dropping emission");
            }
            Err(e) => {
                error!(error = ?e, id = %task.id, "no session available for observation");
            }
        }
    }

    pub fn shutdown(&self, timeout: Duration) {
        self.exec.shutdown(timeout);
    }
}

/// Observer planted on every captured stream; materializes each emission
/// into a sender task. The shared `active` flag is flipped by the registry's
/// cancel-handle, making post-invalidate emissions no-ops.
struct ForwardingObserver {
    id: ObservationId,
    request_id: RequestId,
    client_addr: ClientAddress,
    active: Arc<AtomicBool>,
    sender: Arc<ObservationSender>,
}

impl Observer for ForwardingObserver {
    fn notify(&self, body: Notification) {
        if !self.active.load(Ordering::SeqCst) {
            return;
        }
        self.sender.forward(ObservationTask {
            id: self.id,
            request_id: self.request_id,
            client_addr: self.client_addr.clone(),
            active: self.active.clone(),
            body,
        });
    }
}

/// The codec-side stream sink for one outgoing message: mints ids,
/// subscribes, and registers everything against the originating request and
/// its client address.
pub struct StreamCapture {
    request_id: RequestId,
    client_addr: ClientAddress,
    registry: Arc<SubscriptionRegistry>,
    sender: Arc<ObservationSender>,
}

impl StreamCapture {
    pub fn new(
        request_id: RequestId,
        client_addr: ClientAddress,
        registry: Arc<SubscriptionRegistry>,
        sender: Arc<ObservationSender>,
    ) -> Arc<Self> {
        Arc::new(Self {
            request_id,
            client_addr,
            registry,
            sender,
        })
    }
}

impl StreamSink for StreamCapture {
    fn capture(&self, source: Arc<dyn Observable>) -> Result<ObservationId, EncodeError> {
        let id = ObservationId::mint();
        let active = Arc::new(AtomicBool::new(true));
        let observer = Arc::new(ForwardingObserver {
            id,
            request_id: self.request_id,
            client_addr: self.client_addr.clone(),
            active: active.clone(),
            sender: self.sender.clone(),
        });
        let inner = source.subscribe(observer);
        let handle = Subscription::new(active, Box::new(move || inner.cancel()));
        self.registry.insert(
            id,
            SubscriptionRecord {
                client_addr: self.client_addr.clone(),
                handle,
            },
        );
        trace!(id = %id, request = %self.request_id, client = %self.client_addr,
               "stream captured for delivery");
        Ok(id)
    }
}
