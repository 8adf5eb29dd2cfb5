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

//! The herald RPC server core.
//!
//! Requests arrive on a shared broker ingress queue, get dispatched onto a
//! host-supplied method table, and replies flow back to per-client queues.
//! Any observation stream a reply value contains (at any nesting depth) is
//! captured during reply serialization, subscribed to, and its emissions
//! forwarded to the same client queue until the client releases it, its
//! queue disappears, or the server shuts down.
//!
//! The broker itself, the user directory, and node bootstrap are external
//! collaborators reached through the traits in [`bus`] and [`auth`].

pub mod auth;
pub mod bus;
pub mod config;
pub mod rpc;

mod executor;
mod observations;
mod reaper;
mod session_pool;
mod subscriptions;

#[cfg(test)]
pub mod testing;

pub use auth::{StaticUserDirectory, UserDirectory, UserPrincipal};
pub use config::RpcServerConfig;
pub use rpc::{current_caller, MethodTable, RpcServer};
