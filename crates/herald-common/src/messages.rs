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

//! The wire schema spoken between a server and its client peers.

use crate::errors::RpcError;
use crate::ids::{ClientAddress, ObservationId, RequestId};
use crate::var::Value;
use bincode::{Decode, Encode};

/// Everything a client may put on the server's ingress queue.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub enum ClientToServer {
    Request {
        request_id: RequestId,
        method: String,
        args: Vec<Value>,
        reply_to: ClientAddress,
    },
    /// The client is done with these observation ids; the server releases
    /// the backing subscriptions. Semantically a set; unknown ids are a
    /// no-op.
    ObservablesClosed { ids: Vec<ObservationId> },
}

/// Everything the server may deliver to a client queue.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub enum ServerToClient {
    Reply {
        request_id: RequestId,
        result: ReplyResult,
    },
    Observation {
        id: ObservationId,
        body: Notification,
    },
}

/// Wire form of the reply outcome.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub enum ReplyResult {
    Success(Value),
    Failure(RpcError),
}

impl ReplyResult {
    pub fn into_result(self) -> Result<Value, RpcError> {
        match self {
            ReplyResult::Success(v) => Ok(v),
            ReplyResult::Failure(e) => Err(e),
        }
    }
}

impl From<Result<Value, RpcError>> for ReplyResult {
    fn from(result: Result<Value, RpcError>) -> Self {
        match result {
            Ok(v) => ReplyResult::Success(v),
            Err(e) => ReplyResult::Failure(e),
        }
    }
}

/// One materialized stream emission.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub enum Notification {
    Next(Value),
    Error(RpcError),
    Completed,
}

impl Notification {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Notification::Next(_))
    }
}
