//! Bidirectional AMF0/AMF3 (Action Message Format) codec
//!
//! AMF0 and AMF3 are Adobe's binary wire formats for Flash Remoting and
//! Local Shared Objects. This crate transforms a rooted, possibly cyclic
//! graph of dynamically-typed runtime values ([`Value`]) into a compact
//! byte stream and back, preserving identity of shared subobjects via
//! reference tables and compressing repeated strings (AMF3).
//!
//! # Layout
//!
//! - [`value`] — the runtime value model shared by both wire versions.
//! - [`vlq`] — the AMF3 U29 variable-length integer codec.
//! - [`bytestream`] — the seekable read/write buffers both codecs use.
//! - [`context`] — per-root reference tables and XML safety flags.
//! - [`alias`] — the class-alias registry that maps wire class names to
//!   host types.
//! - [`amf0`] / [`amf3`] — the two wire codecs.
//! - [`lso`] — `.sol` Local Shared Object file framing.
//! - [`dispatch`] — custom type handlers and post-decode hooks.
//! - [`stream_codec`] — a push/pull wrapper over the wire codecs.
//! - [`xmlbridge`] — XML validation with DTD/entity denial.
//! - [`error`] — the shared error/result types.

pub mod alias;
pub mod amf0;
pub mod amf3;
pub mod bytestream;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod lso;
pub mod stream_codec;
pub mod value;
pub mod vlq;
pub mod xmlbridge;

pub use alias::{
    get_class_alias, get_externalizable, has_alias, register_alias_type, register_class,
    register_externalizable, AliasRegistry, AliasSpec, CompiledAlias, Externalizable,
};
pub use amf0::{Amf0Decoder, Amf0Encoder};
pub use amf3::{Amf3Decoder, Amf3Encoder};
pub use bytestream::{ByteStream, ByteWriter};
pub use context::Context;
pub use dispatch::{add_post_decode_processor, add_type, dispatch_encode, run_post_decode};
pub use error::{AmfError, Result};
pub use lso::{Sol, SolEncoding};
pub use stream_codec::{StreamDecoder, StreamEncoder, Wire};
pub use value::{AmfObject, ByteArrayValue, MixedArray, MixedKey, Value};

/// Encodes `value` as a standalone AMF0 byte stream with a fresh [`Context`].
pub fn encode_amf0(value: &Value) -> Result<Vec<u8>> {
    let mut ctx = Context::new();
    let mut w = ByteWriter::new();
    Amf0Encoder::new(&mut ctx).encode(&mut w, value)?;
    Ok(w.finish().to_vec())
}

/// Decodes a standalone AMF0 byte stream with a fresh [`Context`].
pub fn decode_amf0(bytes: &[u8]) -> Result<Value> {
    let mut ctx = Context::new();
    let mut r = ByteStream::new(bytes.to_vec());
    Amf0Decoder::new(&mut ctx).decode(&mut r)
}

/// Encodes `value` as a standalone AMF3 byte stream with a fresh [`Context`].
pub fn encode_amf3(value: &Value) -> Result<Vec<u8>> {
    let mut ctx = Context::new();
    let mut w = ByteWriter::new();
    Amf3Encoder::new(&mut ctx).encode(&mut w, value)?;
    Ok(w.finish().to_vec())
}

/// Decodes a standalone AMF3 byte stream with a fresh [`Context`].
pub fn decode_amf3(bytes: &[u8]) -> Result<Value> {
    let mut ctx = Context::new();
    let mut r = ByteStream::new(bytes.to_vec());
    Amf3Decoder::new(&mut ctx).decode(&mut r)
}

/// Codec-wide tunables: nesting depth limit, decode strictness, and XML
/// safety policy. No config-file parsing — just typed fields with sane
/// defaults, set directly or through the builder methods.
#[derive(Debug, Clone)]
pub struct CodecConfig {
    /// Maximum nested depth (arrays/objects within arrays/objects) a
    /// decoder will follow before giving up with `AmfError::Overflow`.
    pub max_depth: usize,

    /// Lenient decoders tolerate a missing/malformed AMF0 object-end
    /// marker; strict decoders reject it.
    pub lenient: bool,

    /// Reject XML payloads (AMF0/AMF3 `XmlDocument`, AMF3 `XmlString`)
    /// carrying a `DOCTYPE` declaration.
    pub forbid_dtd: bool,

    /// Reject XML `DOCTYPE` declarations that define internal entities,
    /// even when `forbid_dtd` otherwise allows a `DOCTYPE`.
    pub forbid_entities: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_depth: 512,
            lenient: false,
            forbid_dtd: true,
            forbid_entities: true,
        }
    }
}

impl CodecConfig {
    /// Sets the maximum nesting depth.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Enables lenient AMF0 object-end handling.
    pub fn lenient(mut self, lenient: bool) -> Self {
        self.lenient = lenient;
        self
    }

    /// Sets the DOCTYPE denial policy.
    pub fn forbid_dtd(mut self, forbid: bool) -> Self {
        self.forbid_dtd = forbid;
        self
    }

    /// Sets the internal-entity denial policy.
    pub fn forbid_entities(mut self, forbid: bool) -> Self {
        self.forbid_entities = forbid;
        self
    }

    /// Builds a fresh [`Context`] with this config's XML safety policy
    /// applied.
    pub fn new_context(&self) -> Context {
        Context {
            forbid_dtd: self.forbid_dtd,
            forbid_entities: self.forbid_entities,
            max_depth: self.max_depth,
            ..Context::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_level_amf0_round_trip() {
        let bytes = encode_amf0(&Value::String("hello".into())).unwrap();
        assert_eq!(decode_amf0(&bytes).unwrap(), Value::String("hello".into()));
    }

    #[test]
    fn top_level_amf3_round_trip() {
        let bytes = encode_amf3(&Value::Integer(128)).unwrap();
        assert_eq!(decode_amf3(&bytes).unwrap(), Value::Integer(128));
    }

    #[test]
    fn codec_config_defaults_are_strict_and_xml_safe() {
        let config = CodecConfig::default();
        assert!(!config.lenient);
        assert!(config.forbid_dtd);
        assert!(config.forbid_entities);
    }

    #[test]
    fn codec_config_builder_chains_and_propagates_to_context() {
        let config = CodecConfig::default()
            .max_depth(8)
            .lenient(true)
            .forbid_dtd(false)
            .forbid_entities(false);
        assert_eq!(config.max_depth, 8);

        let ctx = config.new_context();
        assert_eq!(ctx.max_depth, 8);
        assert!(!ctx.forbid_dtd);
        assert!(!ctx.forbid_entities);
    }

    #[test]
    fn codec_config_max_depth_is_enforced_by_the_encoder() {
        use crate::amf3::Amf3Encoder;
        use crate::bytestream::ByteWriter;
        use crate::value::Value;

        let mut nested = Value::Integer(0);
        for _ in 0..5 {
            nested = Value::Array(std::rc::Rc::new(std::cell::RefCell::new(vec![nested])));
        }

        let mut ctx = CodecConfig::default().max_depth(3).new_context();
        let mut w = ByteWriter::new();
        let err = Amf3Encoder::new(&mut ctx).encode(&mut w, &nested);
        assert!(err.is_err());

        let mut ctx = CodecConfig::default().max_depth(100).new_context();
        let mut w = ByteWriter::new();
        assert!(Amf3Encoder::new(&mut ctx).encode(&mut w, &nested).is_ok());
    }
}
