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

//! RPC dispatch business logic, separated from transport concerns: decode
//! the ingress message, resolve the caller, run the host method on the
//! request executor, and send the reply through a sticky session.

use crate::auth::{UserDirectory, UserPrincipal};
use crate::bus::{Delivery, Envelope};
use crate::executor::Executor;
use crate::observations::{ObservationSender, StreamCapture};
use crate::session_pool::SessionPool;
use crate::subscriptions::SubscriptionRegistry;
use eyre::bail;
use herald_common::codec;
use herald_common::{
    ClientAddress, ClientToServer, ReplyResult, RequestId, RpcError, ServerToClient, Value,
};
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, warn};

pub type MethodFn = Box<dyn Fn(&[Value]) -> Result<Value, RpcError> + Send + Sync>;

/// Name to handler table for the host object, built once before the server
/// starts. Method overloading is not supported, so a duplicate name is fatal
/// at registration time.
#[derive(Default)]
pub struct MethodTable {
    methods: HashMap<String, MethodFn>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: &str,
        method: impl Fn(&[Value]) -> Result<Value, RpcError> + Send + Sync + 'static,
    ) -> eyre::Result<()> {
        if self.methods.contains_key(name) {
            bail!("duplicate RPC method name: {name}");
        }
        self.methods.insert(name.to_string(), Box::new(method));
        Ok(())
    }

    /// Run the named method. A panicking method surfaces its panic payload
    /// as the invocation error, the way a thrown cause is unwrapped from an
    /// invocation-target wrapper.
    fn invoke(&self, name: &str, args: &[Value]) -> Result<Value, RpcError> {
        let Some(method) = self.methods.get(name) else {
            return Err(RpcError::UnknownMethod(name.to_string()));
        };
        match catch_unwind(AssertUnwindSafe(|| method(args))) {
            Ok(result) => result,
            Err(payload) => Err(RpcError::Invocation(panic_message(payload))),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "host method panicked".to_string()
    }
}

/// Caller identity for the currently-executing RPC method.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub principal: UserPrincipal,
}

thread_local! {
    static CALL_CONTEXT: RefCell<Option<CallContext>> = const { RefCell::new(None) };
}

/// Host code may ask who is calling it, for exactly the duration of the
/// invocation. `None` anywhere outside one.
pub fn current_caller() -> Option<UserPrincipal> {
    CALL_CONTEXT.with(|slot| slot.borrow().as_ref().map(|ctx| ctx.principal.clone()))
}

struct CallContextGuard;

impl CallContextGuard {
    fn install(principal: UserPrincipal) -> Self {
        CALL_CONTEXT.with(|slot| *slot.borrow_mut() = Some(CallContext { principal }));
        Self
    }
}

impl Drop for CallContextGuard {
    // Drop runs on unwind too, so the context cannot leak across calls.
    fn drop(&mut self) {
        CALL_CONTEXT.with(|slot| *slot.borrow_mut() = None);
    }
}

pub struct Dispatcher {
    methods: MethodTable,
    users: Arc<dyn UserDirectory>,
    node_legal_name: String,
    registry: Arc<SubscriptionRegistry>,
    pool: Arc<SessionPool>,
    sender: Arc<ObservationSender>,
    exec: Arc<Executor>,
}

impl Dispatcher {
    pub fn new(
        methods: MethodTable,
        users: Arc<dyn UserDirectory>,
        node_legal_name: String,
        registry: Arc<SubscriptionRegistry>,
        pool: Arc<SessionPool>,
        sender: Arc<ObservationSender>,
        exec: Arc<Executor>,
    ) -> Arc<Self> {
        Arc::new(Self {
            methods,
            users,
            node_legal_name,
            registry,
            pool,
            sender,
            exec,
        })
    }

    /// Entry point for ingress consumers. Runs on broker threads, so it only
    /// decodes, schedules, and acks; host methods never execute here.
    ///
    /// The ack is unconditional once handling has been scheduled. A crash
    /// between schedule and serve loses the call with no broker redelivery;
    /// clients are expected to time out and retry.
    pub fn handle_delivery(self: &Arc<Self>, delivery: Delivery) {
        match codec::decode::<ClientToServer>(&delivery.envelope.payload) {
            Err(e) => {
                warn!(error = ?e, "undecodable ingress message; dropping");
            }
            Ok(ClientToServer::ObservablesClosed { ids }) => {
                debug!(count = ids.len(), "client released observables");
                self.registry.invalidate(&ids);
            }
            Ok(ClientToServer::Request {
                request_id,
                method,
                args,
                reply_to,
            }) => {
                self.schedule_request(
                    request_id,
                    method,
                    args,
                    reply_to,
                    delivery.envelope.validated_user.clone(),
                );
            }
        }
        delivery.ack();
    }

    fn schedule_request(
        self: &Arc<Self>,
        request_id: RequestId,
        method: String,
        args: Vec<Value>,
        reply_to: ClientAddress,
        validated_user: Option<String>,
    ) {
        let dispatcher = self.clone();
        let job = Box::new(move || {
            let result = match dispatcher.resolve_principal(validated_user) {
                Ok(principal) => {
                    debug!(request = %request_id, method = %method, caller = %principal.name,
                           "dispatching request");
                    let _call = CallContextGuard::install(principal);
                    dispatcher.methods.invoke(&method, &args)
                }
                Err(e) => Err(e),
            };
            dispatcher.send_reply(request_id, &reply_to, result);
        });
        if self.exec.submit(job).is_err() {
            error!(request = %request_id, "unable to schedule request; message lost");
        }
    }

    fn resolve_principal(&self, validated_user: Option<String>) -> Result<UserPrincipal, RpcError> {
        let Some(name) = validated_user else {
            return Err(RpcError::InvalidRequest(
                "ingress message missing validated user header".to_string(),
            ));
        };
        if let Some(principal) = self.users.resolve(&name) {
            return Ok(principal);
        }
        if name == self.node_legal_name {
            return Ok(UserPrincipal::node(&name));
        }
        Err(RpcError::Unauthorized(name))
    }

    /// Serialize and send the reply. The sticky slot is claimed before
    /// encoding: any stream the encode captures hands its first emissions to
    /// the observation sender, and those sends queue up behind this claim on
    /// the same session, so the reply always reaches the client first.
    fn send_reply(
        self: &Arc<Self>,
        request_id: RequestId,
        reply_to: &ClientAddress,
        result: Result<Value, RpcError>,
    ) {
        let message = ServerToClient::Reply {
            request_id,
            result: ReplyResult::from(result),
        };
        let sink = StreamCapture::new(
            request_id,
            reply_to.clone(),
            self.registry.clone(),
            self.sender.clone(),
        );
        let claimed = self.pool.with_sticky(request_id, |session| {
            let bytes = match codec::encode_with_sink(&message, sink) {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!(error = ?e, request = %request_id, "unable to encode reply; dropping");
                    return;
                }
            };
            if let Err(e) = session.send(reply_to.as_str(), Envelope::new(bytes)) {
                error!(error = ?e, request = %request_id, client = %reply_to,
                       "unable to deliver reply; dropping");
            }
        });
        if let Err(e) = claimed {
            error!(error = ?e, request = %request_id, "no session available for reply");
        }
    }
}
