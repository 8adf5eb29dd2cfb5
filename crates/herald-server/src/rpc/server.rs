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

//! Server assembly and lifecycle: ingress consumers in, reaper on a timer,
//! ordered teardown out.

use crate::auth::UserDirectory;
use crate::bus::{Bus, BusSession};
use crate::config::RpcServerConfig;
use crate::executor::Executor;
use crate::observations::ObservationSender;
use crate::reaper::{self, ReaperHandle};
use crate::rpc::message_handler::{Dispatcher, MethodTable};
use crate::session_pool::SessionPool;
use crate::subscriptions::SubscriptionRegistry;
use eyre::{bail, eyre};
use herald_common::RPC_SERVER_QUEUE;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// How long executors get to drain queued work at close.
const EXECUTOR_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

pub struct RpcServer {
    config: RpcServerConfig,
    bus: Arc<dyn Bus>,
    dispatcher: Arc<Dispatcher>,
    registry: Arc<SubscriptionRegistry>,
    pool: Arc<SessionPool>,
    sender: Arc<ObservationSender>,
    rpc_exec: Arc<Executor>,
    consumers: Mutex<Vec<Box<dyn BusSession>>>,
    reaper: Mutex<Option<ReaperHandle>>,
    started: AtomicBool,
    closed: AtomicBool,
}

impl RpcServer {
    pub fn new(
        config: RpcServerConfig,
        bus: Arc<dyn Bus>,
        methods: MethodTable,
        users: Arc<dyn UserDirectory>,
    ) -> eyre::Result<Arc<Self>> {
        config.validate()?;
        let registry = Arc::new(SubscriptionRegistry::new());
        let pool = Arc::new(SessionPool::new(bus.clone(), config.producer_pool_bound));
        let sender = ObservationSender::new(pool.clone(), registry.clone());
        let rpc_exec = Arc::new(Executor::new("herald-rpc", config.rpc_thread_pool_size));
        let dispatcher = Dispatcher::new(
            methods,
            users,
            config.node_legal_name.clone(),
            registry.clone(),
            pool.clone(),
            sender.clone(),
            rpc_exec.clone(),
        );
        Ok(Arc::new(Self {
            config,
            bus,
            dispatcher,
            registry,
            pool,
            sender,
            rpc_exec,
            consumers: Mutex::new(Vec::new()),
            reaper: Mutex::new(None),
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }))
    }

    pub fn start(self: &Arc<Self>) -> eyre::Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            bail!("rpc server already started");
        }

        // Reaper first, so orphaned subscriptions are collected even if
        // consumer attachment fails partway.
        let reaper = reaper::start(
            self.registry.clone(),
            self.pool.clone(),
            self.config.reap_interval(),
        )?;
        *self.reaper.lock() = Some(reaper);

        let mut consumers = self.consumers.lock();
        for _ in 0..self.config.consumer_pool_size {
            let mut session = self
                .bus
                .open_session()
                .map_err(|e| eyre!("unable to open consumer session: {e}"))?;
            let dispatcher = self.dispatcher.clone();
            session
                .consume(
                    RPC_SERVER_QUEUE,
                    Arc::new(move |delivery| dispatcher.handle_delivery(delivery)),
                )
                .map_err(|e| eyre!("unable to attach consumer: {e}"))?;
            consumers.push(session);
        }
        info!(
            consumers = consumers.len(),
            queue = RPC_SERVER_QUEUE,
            "rpc server started"
        );
        Ok(())
    }

    /// Live subscription count, for operational introspection.
    pub fn live_subscriptions(&self) -> usize {
        self.registry.len()
    }

    /// Idempotent shutdown. Order matters: the reaper goes first and every
    /// remaining subscription's cancel-handle fires in its final pass; then
    /// the executors drain; consumers and pooled sessions close last.
    /// Messages arriving between reaper cancellation and consumer close are
    /// silently dropped.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(reaper) = self.reaper.lock().take() {
            reaper.stop();
        }
        self.registry.invalidate_all();
        reaper::reap_pass(&self.registry, &self.pool);

        self.rpc_exec.shutdown(EXECUTOR_DRAIN_TIMEOUT);
        self.sender.shutdown(EXECUTOR_DRAIN_TIMEOUT);

        for mut session in self.consumers.lock().drain(..) {
            session.close();
        }
        self.pool.close();
        info!("rpc server closed");
    }
}

impl Drop for RpcServer {
    fn drop(&mut self) {
        self.close();
    }
}
