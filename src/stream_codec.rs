//! Push/pull state-machine wrapper over the AMF0/AMF3 codecs (spec.md §4.8)
//!
//! `send` queues a logical unit — bytes to decode, or a value to encode —
//! and `next` drains one unit of output. The decode side checkpoints the
//! buffer position before each top-level read; a short read reverts the
//! position and surfaces `EndOfStream` so the caller can append more bytes
//! and retry (the same checkpoint-and-retry idiom `ByteStream::seek` exists
//! for).

use crate::amf0::{Amf0Decoder, Amf0Encoder};
use crate::amf3::{Amf3Decoder, Amf3Encoder};
use crate::bytestream::{ByteStream, ByteWriter};
use crate::context::Context;
use crate::error::{AmfError, Result};
use crate::value::Value;

/// Which wire codec a [`StreamCodec`] drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wire {
    Amf0,
    Amf3,
}

/// A push/pull decoder: `send` appends bytes, `next` pulls one fully
/// decoded value, or `Ok(None)` if the buffered bytes don't yet contain a
/// complete value.
pub struct StreamDecoder {
    wire: Wire,
    ctx: Context,
    buf: Vec<u8>,
    pos: usize,
}

impl StreamDecoder {
    pub fn new(wire: Wire) -> Self {
        Self {
            wire,
            ctx: Context::new(),
            buf: Vec::new(),
            pos: 0,
        }
    }

    /// Appends more input bytes to the internal buffer.
    pub fn send(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Attempts to decode the next value. Returns `Ok(None)` on a clean
    /// `EndOfStream` (not enough buffered bytes yet) without consuming
    /// anything; propagates any other error.
    #[allow(clippy::should_implement_trait)] // `send`/`next` push-pull naming, not Iterator
    pub fn next(&mut self) -> Result<Option<Value>> {
        if self.pos >= self.buf.len() {
            return Ok(None);
        }
        // A decode attempt that runs out of bytes partway through an
        // object/array may have already reserved reference-table slots for
        // its not-yet-complete children. Snapshot all three decode-side
        // tables so a retry over more bytes reassigns the same indices
        // instead of drifting out of sync with the encoder.
        let objects_snapshot = self.ctx.objects.decoded_len();
        let strings_snapshot = self.ctx.strings.decoded_len();
        let classes_snapshot = self.ctx.classes.decoded_len();

        let mut r = ByteStream::new(self.buf[self.pos..].to_vec());
        let result = match self.wire {
            Wire::Amf0 => Amf0Decoder::new(&mut self.ctx).decode(&mut r),
            Wire::Amf3 => Amf3Decoder::new(&mut self.ctx).decode(&mut r),
        };
        match result {
            Ok(value) => {
                self.pos += r.position();
                Ok(Some(value))
            }
            Err(AmfError::EndOfStream) => {
                self.ctx.objects.truncate_decoded(objects_snapshot);
                self.ctx.strings.truncate_decoded(strings_snapshot);
                self.ctx.classes.truncate_decoded(classes_snapshot);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Drops already-consumed bytes from the front of the internal buffer.
    /// Callers with long-lived streams should call this periodically so
    /// the buffer doesn't grow without bound.
    pub fn compact(&mut self) {
        self.buf.drain(..self.pos);
        self.pos = 0;
    }
}

/// A push/pull encoder: `send` queues a value, `next` pulls the encoded
/// bytes for one queued value.
pub struct StreamEncoder {
    wire: Wire,
    ctx: Context,
    queue: std::collections::VecDeque<Value>,
}

impl StreamEncoder {
    pub fn new(wire: Wire) -> Self {
        Self {
            wire,
            ctx: Context::new(),
            queue: std::collections::VecDeque::new(),
        }
    }

    pub fn send(&mut self, value: Value) {
        self.queue.push_back(value);
    }

    #[allow(clippy::should_implement_trait)] // `send`/`next` push-pull naming, not Iterator
    pub fn next(&mut self) -> Result<Option<Vec<u8>>> {
        let Some(value) = self.queue.pop_front() else {
            return Ok(None);
        };
        let mut w = ByteWriter::new();
        match self.wire {
            Wire::Amf0 => Amf0Encoder::new(&mut self.ctx).encode(&mut w, &value)?,
            Wire::Amf3 => Amf3Encoder::new(&mut self.ctx).encode(&mut w, &value)?,
        }
        Ok(Some(w.finish().to_vec()))
    }
}
