//! Error taxonomy for the AMF codec
//!
//! One enum covers both AMF0 and AMF3, encode and decode. Variants follow
//! the tag-level kinds named by the format spec rather than mirroring
//! every internal failure site.

use std::fmt;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AmfError>;

/// Errors produced by encoding, decoding, alias compilation, and framing.
#[derive(Debug)]
pub enum AmfError {
    /// Unsupported tag byte, malformed header, or XML parse failure on decode.
    Decode(String),
    /// A value has no AMF mapping, or violates an encode-time invariant
    /// (e.g. an empty string key in an associative array).
    Encode(String),
    /// A reference index pointed at an entry the context hasn't populated yet.
    Reference(u32),
    /// Decoder hit a class name with no registered alias while in strict mode.
    UnknownClassAlias(String),
    /// Short read at a value boundary. The stream position is restored to
    /// where the read started; the caller may append more bytes and retry.
    EndOfStream,
    /// A VLQ integer was out of the representable 29-bit range, or a
    /// length-prefixed field overflowed its width.
    Overflow(String),
    /// A tag that AMF reserves but never defines a body for (MovieClip,
    /// RecordSet).
    Unsupported(&'static str),
    /// Propagated I/O failure from the underlying byte cursor.
    Io(std::io::Error),
}

impl fmt::Display for AmfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmfError::Decode(msg) => write!(f, "AMF decode error: {}", msg),
            AmfError::Encode(msg) => write!(f, "AMF encode error: {}", msg),
            AmfError::Reference(idx) => write!(f, "invalid reference index: {}", idx),
            AmfError::UnknownClassAlias(name) => {
                write!(f, "no class alias registered for {:?}", name)
            }
            AmfError::EndOfStream => write!(f, "end of stream"),
            AmfError::Overflow(msg) => write!(f, "overflow: {}", msg),
            AmfError::Unsupported(tag) => write!(f, "unsupported AMF tag: {}", tag),
            AmfError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for AmfError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AmfError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for AmfError {
    fn from(e: std::io::Error) -> Self {
        AmfError::Io(e)
    }
}
