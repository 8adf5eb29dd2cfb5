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

//! The wire-visible failure taxonomy. Only errors a client can act on cross
//! the wire; infrastructure faults (serialization, transport, lifecycle) are
//! logged server-side and the affected message is dropped.

use bincode::{Decode, Encode};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Encode, Decode)]
pub enum RpcError {
    /// The request could not be understood: undecodable body, or a missing
    /// broker-validated user header.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// No such method on the host object. Usually version skew between the
    /// client and server.
    #[error("unknown method '{0}', possible version skew")]
    UnknownMethod(String),
    /// The broker-validated user has no record with the node.
    #[error("user '{0}' is not authorized on this node")]
    Unauthorized(String),
    /// The host method itself failed; carries the underlying cause, already
    /// unwrapped from any invocation wrapper.
    #[error("method invocation failed: {0}")]
    Invocation(String),
}
