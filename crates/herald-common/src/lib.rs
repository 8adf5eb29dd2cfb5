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

//! Wire-shared layer for the herald RPC system: the dynamic value model,
//! wire message schema, error taxonomy, identifiers, the stream-aware codec,
//! and the observable primitives that make server-pushed streams possible.
//!
//! Both the server and any client peer compile against this crate; the wire
//! format is bincode (standard varint configuration) throughout.

pub mod codec;
pub mod errors;
pub mod ids;
pub mod messages;
pub mod observable;
pub mod var;

pub use errors::RpcError;
pub use ids::{
    ClientAddress, ObservationId, RequestId, RPC_CLIENT_QUEUE_PREFIX, RPC_SERVER_QUEUE,
};
pub use messages::{ClientToServer, Notification, ReplyResult, ServerToClient};
pub use observable::{Observable, Observer, Subject, Subscription};
pub use var::{StreamRef, Value};
