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

//! Server tuning knobs, deserializable from whatever configuration source
//! the embedding node uses.

use eyre::bail;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcServerConfig {
    /// The node's own legal identity. A broker-validated user of this name
    /// with no directory record dispatches as the NODE principal.
    pub node_legal_name: String,
    /// Worker threads executing host methods and reply serialization.
    pub rpc_thread_pool_size: usize,
    /// Broker consumers attached to the shared ingress queue.
    pub consumer_pool_size: usize,
    /// Bound on pooled broker sessions for outbound delivery.
    pub producer_pool_bound: usize,
    /// How often the reaper reconciles subscriptions against live queues.
    pub reap_interval_ms: u64,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            node_legal_name: "herald-node".to_string(),
            rpc_thread_pool_size: 4,
            consumer_pool_size: 1,
            producer_pool_bound: 4,
            reap_interval_ms: 1000,
        }
    }
}

impl RpcServerConfig {
    pub fn validate(&self) -> eyre::Result<()> {
        if self.node_legal_name.is_empty() {
            bail!("node_legal_name must not be empty");
        }
        if self.rpc_thread_pool_size == 0 {
            bail!("rpc_thread_pool_size must be positive");
        }
        if self.consumer_pool_size == 0 {
            bail!("consumer_pool_size must be positive");
        }
        if self.producer_pool_bound == 0 {
            bail!("producer_pool_bound must be positive");
        }
        if self.reap_interval_ms == 0 {
            bail!("reap_interval_ms must be positive");
        }
        Ok(())
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        RpcServerConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_sized_pools_are_rejected() {
        let mut config = RpcServerConfig::default();
        config.producer_pool_bound = 0;
        assert!(config.validate().is_err());

        let mut config = RpcServerConfig::default();
        config.rpc_thread_pool_size = 0;
        assert!(config.validate().is_err());

        let mut config = RpcServerConfig::default();
        config.consumer_pool_size = 0;
        assert!(config.validate().is_err());

        let mut config = RpcServerConfig::default();
        config.reap_interval_ms = 0;
        assert!(config.validate().is_err());
    }
}
