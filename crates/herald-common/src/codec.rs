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

//! The wire codec: bincode underneath, plus the per-encode context slot the
//! stream handler reads whenever a `StreamRef::Source` is encountered.
//!
//! The slot is a thread-local installed for the duration of exactly one
//! encode. That gives every stream value in the encoded tree, however deeply
//! nested, access to the identity of the client the message is going to,
//! without threading that context through every nested encode call.

use crate::ids::ObservationId;
use crate::observable::Observable;
use bincode::error::{DecodeError, EncodeError};
use bincode::{Decode, Encode};
use std::cell::RefCell;
use std::sync::Arc;

/// Installed for one encode; receives every stream source the encoder
/// encounters and answers with the id to put on the wire. Implementations
/// subscribe to the source and register the resulting subscription before
/// returning.
pub trait StreamSink: Send + Sync {
    fn capture(&self, source: Arc<dyn Observable>) -> Result<ObservationId, EncodeError>;
}

thread_local! {
    static STREAM_SINK: RefCell<Option<Arc<dyn StreamSink>>> = const { RefCell::new(None) };
}

/// RAII installation of the encode-time stream sink. Restores the previous
/// slot value on drop so nested encodes on the same thread stay correct.
struct SinkGuard {
    prev: Option<Arc<dyn StreamSink>>,
}

impl SinkGuard {
    fn install(sink: Arc<dyn StreamSink>) -> Self {
        let prev = STREAM_SINK.with(|slot| slot.borrow_mut().replace(sink));
        Self { prev }
    }
}

impl Drop for SinkGuard {
    fn drop(&mut self) {
        let prev = self.prev.take();
        STREAM_SINK.with(|slot| *slot.borrow_mut() = prev);
    }
}

/// Called by the `StreamRef` encode impl when it hits a live source.
pub(crate) fn capture_stream(source: Arc<dyn Observable>) -> Result<ObservationId, EncodeError> {
    let sink = STREAM_SINK.with(|slot| slot.borrow().clone());
    match sink {
        Some(sink) => sink.capture(source),
        None => Err(EncodeError::Other(
            "stream value encoded outside a reply encode context",
        )),
    }
}

/// Encode an outgoing message with a stream sink in place; any stream source
/// in the tree is captured through the sink and serialized as its id.
pub fn encode_with_sink<T: Encode>(
    message: &T,
    sink: Arc<dyn StreamSink>,
) -> Result<Vec<u8>, EncodeError> {
    let _guard = SinkGuard::install(sink);
    bincode::encode_to_vec(message, bincode::config::standard())
}

/// Encode a message that must not contain live stream sources.
pub fn encode<T: Encode>(message: &T) -> Result<Vec<u8>, EncodeError> {
    bincode::encode_to_vec(message, bincode::config::standard())
}

pub fn decode<T: Decode<()>>(bytes: &[u8]) -> Result<T, DecodeError> {
    let (message, _) = bincode::decode_from_slice(bytes, bincode::config::standard())?;
    Ok(message)
}
