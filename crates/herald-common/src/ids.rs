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

//! Identifiers and well-known broker addresses shared between the server and
//! its peers.

use bincode::{Decode, Encode};
use rand::Rng;
use std::fmt::{Display, Formatter};

/// The single well-known ingress address every server instance consumes from.
pub const RPC_SERVER_QUEUE: &str = "herald.rpc.server";

/// Prefix under which clients create their per-session reply queues. The
/// reaper reconciles registered subscriptions against live queues matching
/// this prefix.
pub const RPC_CLIENT_QUEUE_PREFIX: &str = "herald.rpc.client.";

/// Client-chosen correlation id for one RPC call. Opaque to the server;
/// unique per client for the duration of the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode)]
pub struct RequestId(pub u64);

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server-minted identifier correlating a wire stream with its server-side
/// subscription. Non-negative and 63 bits wide so every peer can carry it in
/// a signed 64-bit slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode)]
pub struct ObservationId(pub u64);

impl ObservationId {
    /// Mint a fresh id. Random draw; collision probability over a server
    /// process lifetime is negligible.
    pub fn mint() -> Self {
        Self(rand::thread_rng().gen::<u64>() & (u64::MAX >> 1))
    }
}

impl Display for ObservationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Broker routing token naming the queue that replies and observations for a
/// call are delivered to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode)]
pub struct ClientAddress(pub String);

impl ClientAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ClientAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ClientAddress {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
