//! AMF3 encoder and decoder
//!
//! AMF3 (ActionScript 3.0) is the denser of the two wire versions: integers
//! get a native VLQ form, strings and objects share reference tables so a
//! repeat costs only a couple of bytes, and typed objects carry a compiled
//! trait (static attribute order, dynamic/externalizable flags) instead of
//! a flat name-value list.
//!
//! Type Markers:
//! ```text
//! 0x00 - Undefined
//! 0x01 - Null
//! 0x02 - Boolean false
//! 0x03 - Boolean true
//! 0x04 - Integer (29-bit signed)
//! 0x05 - Double
//! 0x06 - String
//! 0x07 - XML Document (legacy)
//! 0x08 - Date
//! 0x09 - Array
//! 0x0A - Object
//! 0x0B - XML
//! 0x0C - ByteArray
//! ```

use std::cell::RefCell;
use std::io::{Read, Write};
use std::rc::Rc;
use std::sync::Arc;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::alias::{self, CompiledAlias};
use crate::bytestream::{ByteStream, ByteWriter};
use crate::context::Context;
use crate::error::{AmfError, Result};
use crate::value::{AmfObject, ByteArrayValue, MixedArray, MixedKey, Value};
use crate::vlq::{self, MAX_29B_INT, MIN_29B_INT};
use crate::xmlbridge;

const MARKER_UNDEFINED: u8 = 0x00;
const MARKER_NULL: u8 = 0x01;
const MARKER_FALSE: u8 = 0x02;
const MARKER_TRUE: u8 = 0x03;
const MARKER_INTEGER: u8 = 0x04;
const MARKER_DOUBLE: u8 = 0x05;
const MARKER_STRING: u8 = 0x06;
const MARKER_XML_DOC: u8 = 0x07;
const MARKER_DATE: u8 = 0x08;
const MARKER_ARRAY: u8 = 0x09;
const MARKER_OBJECT: u8 = 0x0A;
const MARKER_XML: u8 = 0x0B;
const MARKER_BYTE_ARRAY: u8 = 0x0C;

/// zlib's default two-byte header. `ByteArray.compressed` bodies that
/// start this way get inflated on decode (spec.md §4.5).
const ZLIB_HEADER: [u8; 2] = [0x78, 0x9C];
/// The historical byte-2 rewrite this format applies to a freshly deflated
/// compressed `ByteArray` body — kept byte-for-byte for wire compatibility
/// (spec.md §9 open question (b)); decode accepts either form.
const ZLIB_HEADER_QUIRK_BYTE: u8 = 0xDA;

fn read_header(r: &mut ByteStream, signed: bool) -> Result<u32> {
    let n = r.remaining().min(4);
    let peeked = r.peek(n)?;
    let (value, consumed) = vlq::decode_u29(&peeked, signed)?;
    r.seek(r.position() + consumed);
    Ok(value)
}

fn write_header(w: &mut ByteWriter, value: u32) {
    w.write_bytes(&vlq::encode_u29_raw(value));
}

/// Decode-side bug-compatibility: a string key that round-trips cleanly
/// through `i64::to_string` is stored with an integer key instead of a
/// string one (spec.md §8 "Dict edge case").
fn insert_bug_compat(m: &mut MixedArray, key: String, value: Value) {
    if let Ok(n) = key.parse::<i64>() {
        if n.to_string() == key {
            m.insert(n, value);
            return;
        }
    }
    m.insert(key, value);
}

pub struct Amf3Encoder<'c> {
    ctx: &'c mut Context,
    depth: usize,
}

impl<'c> Amf3Encoder<'c> {
    pub fn new(ctx: &'c mut Context) -> Self {
        Self { ctx, depth: 0 }
    }

    pub fn encode(&mut self, w: &mut ByteWriter, value: &Value) -> Result<()> {
        self.depth += 1;
        if self.depth > self.ctx.max_depth {
            self.depth -= 1;
            tracing::warn!(depth = self.depth, "AMF3 encode nesting limit exceeded");
            return Err(AmfError::Encode("AMF3 nesting too deep".into()));
        }
        if self.depth == 1 {
            tracing::debug!(variant = value.type_name(), "encoding AMF3 value");
        }
        let result = self.encode_value(w, value);
        self.depth -= 1;
        result
    }

    fn encode_value(&mut self, w: &mut ByteWriter, value: &Value) -> Result<()> {
        match value {
            Value::Undefined => w.write_u8(MARKER_UNDEFINED),
            Value::Null => w.write_u8(MARKER_NULL),
            Value::Boolean(false) => w.write_u8(MARKER_FALSE),
            Value::Boolean(true) => w.write_u8(MARKER_TRUE),
            Value::Integer(i) if *i >= MIN_29B_INT as i64 && *i <= MAX_29B_INT as i64 => {
                w.write_u8(MARKER_INTEGER);
                w.write_bytes(&vlq::encode_u29(*i as i32)?);
            }
            Value::Integer(i) => {
                w.write_u8(MARKER_DOUBLE);
                w.write_f64(*i as f64);
            }
            Value::Double(n) => {
                w.write_u8(MARKER_DOUBLE);
                w.write_f64(*n);
            }
            Value::ByteString(bytes) => {
                w.write_u8(MARKER_STRING);
                let s = String::from_utf8_lossy(bytes).into_owned();
                self.write_string(w, &s);
            }
            Value::String(s) => {
                w.write_u8(MARKER_STRING);
                self.write_string(w, s);
            }
            Value::Date(millis) => {
                w.write_u8(MARKER_DATE);
                self.ctx.objects.register_anonymous();
                write_header(w, 1);
                w.write_f64(*millis);
            }
            Value::Array(_) | Value::MixedArray(_) => {
                w.write_u8(MARKER_ARRAY);
                self.encode_array(w, value)?;
            }
            Value::Object(_) | Value::TypedObject(_) => {
                w.write_u8(MARKER_OBJECT);
                self.encode_object(w, value)?;
            }
            Value::XmlDocument(s) => {
                w.write_u8(MARKER_XML_DOC);
                self.encode_xml_body(w, s)?;
            }
            Value::XmlString(s) => {
                w.write_u8(MARKER_XML);
                self.encode_xml_body(w, s)?;
            }
            Value::ByteArray(_) => {
                w.write_u8(MARKER_BYTE_ARRAY);
                self.encode_byte_array(w, value)?;
            }
        }
        Ok(())
    }

    fn write_string(&mut self, w: &mut ByteWriter, s: &str) {
        if s.is_empty() {
            write_header(w, 1);
            return;
        }
        if let Some(idx) = self.ctx.strings.reference_or_register(s) {
            write_header(w, idx << 1);
        } else {
            write_header(w, ((s.len() as u32) << 1) | 1);
            w.write_bytes(s.as_bytes());
        }
    }

    fn encode_xml_body(&mut self, w: &mut ByteWriter, s: &str) -> Result<()> {
        xmlbridge::from_bytes(s.as_bytes(), self.ctx.forbid_dtd, self.ctx.forbid_entities)?;
        self.ctx.objects.register_anonymous();
        let bytes = xmlbridge::to_bytes(s);
        write_header(w, ((bytes.len() as u32) << 1) | 1);
        w.write_bytes(&bytes);
        Ok(())
    }

    fn encode_array(&mut self, w: &mut ByteWriter, value: &Value) -> Result<()> {
        if let Some(idx) = self.ctx.objects.reference_or_register(value) {
            write_header(w, idx << 1);
            return Ok(());
        }
        match value {
            Value::Array(items) => {
                let items = items.borrow();
                write_header(w, ((items.len() as u32) << 1) | 1);
                self.write_string(w, "");
                for item in items.iter() {
                    self.encode(w, item)?;
                }
            }
            Value::MixedArray(m) => {
                let m = m.borrow();
                let dense_count = m.dense_prefix().len();
                write_header(w, ((dense_count as u32) << 1) | 1);
                for (key, val) in m.iter() {
                    let is_dense = matches!(key, MixedKey::Integer(i) if *i >= 0 && (*i as usize) < dense_count);
                    if is_dense {
                        continue;
                    }
                    let key_str = match key {
                        MixedKey::Integer(i) => i.to_string(),
                        MixedKey::String(s) => s.clone(),
                    };
                    self.write_string(w, &key_str);
                    self.encode(w, val)?;
                }
                self.write_string(w, "");
                for val in m.dense_prefix() {
                    self.encode(w, val)?;
                }
            }
            _ => unreachable!("encode_array called on non-array Value"),
        }
        Ok(())
    }

    fn resolve_trait(&mut self, obj: &AmfObject) -> Result<Arc<CompiledAlias>> {
        if !obj.is_anonymous() && alias::has_alias(&obj.class_name) {
            alias::get_class_alias(&obj.class_name)
        } else {
            Ok(CompiledAlias::from_wire(obj.class_name.clone(), Vec::new(), true, false))
        }
    }

    fn encode_object(&mut self, w: &mut ByteWriter, value: &Value) -> Result<()> {
        if let Some(idx) = self.ctx.objects.reference_or_register(value) {
            write_header(w, idx << 1);
            return Ok(());
        }

        let obj_rc = match value {
            Value::Object(o) | Value::TypedObject(o) => o.clone(),
            _ => unreachable!("encode_object called on non-object Value"),
        };
        let obj = obj_rc.borrow();
        let trait_def = self.resolve_trait(&obj)?;

        if let Some(idx) = self.ctx.classes.reference_or_register(&trait_def) {
            write_header(w, (idx << 2) | 0b01);
        } else {
            let mut flags: u32 = 0b11;
            if trait_def.external {
                flags |= 0b100;
            }
            if trait_def.dynamic {
                flags |= 0b1000;
            }
            flags |= (trait_def.static_attrs.len() as u32) << 4;
            write_header(w, flags);
            self.write_string(w, &trait_def.type_name);
            for name in &trait_def.static_attrs {
                let wire_name = trait_def
                    .synonym_mem_to_wire
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| name.clone());
                self.write_string(w, &wire_name);
            }
        }

        if trait_def.external {
            let handler = alias::get_externalizable(&trait_def.type_name).ok_or_else(|| {
                AmfError::Encode(format!(
                    "no externalizable handler registered for {:?}",
                    trait_def.type_name
                ))
            })?;
            handler.write_external(&obj, w, self.ctx)?;
            return Ok(());
        }

        for name in &trait_def.static_attrs {
            let v = obj.attrs.get(name).cloned().unwrap_or(Value::Undefined);
            self.encode(w, &v)?;
        }
        if trait_def.dynamic {
            for (wire_name, v) in trait_def.dynamic_extra_attrs(&obj) {
                self.write_string(w, &wire_name);
                self.encode(w, &v)?;
            }
            self.write_string(w, "");
        }
        Ok(())
    }

    fn encode_byte_array(&mut self, w: &mut ByteWriter, value: &Value) -> Result<()> {
        if let Some(idx) = self.ctx.objects.reference_or_register(value) {
            write_header(w, idx << 1);
            return Ok(());
        }
        let ba = match value {
            Value::ByteArray(b) => b.clone(),
            _ => unreachable!("encode_byte_array called on non-byte-array Value"),
        };
        let ba = ba.borrow();
        let bytes: Vec<u8> = if ba.compressed {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&ba.data)?;
            let mut compressed = encoder.finish()?;
            if compressed.len() > 1 && compressed[1] == ZLIB_HEADER[1] {
                compressed[1] = ZLIB_HEADER_QUIRK_BYTE;
            }
            compressed
        } else {
            ba.data.clone()
        };
        write_header(w, ((bytes.len() as u32) << 1) | 1);
        w.write_bytes(&bytes);
        Ok(())
    }
}

pub struct Amf3Decoder<'c> {
    ctx: &'c mut Context,
    depth: usize,
}

impl<'c> Amf3Decoder<'c> {
    pub fn new(ctx: &'c mut Context) -> Self {
        Self { ctx, depth: 0 }
    }

    pub fn decode(&mut self, r: &mut ByteStream) -> Result<Value> {
        self.depth += 1;
        if self.depth > self.ctx.max_depth {
            self.depth -= 1;
            tracing::warn!(depth = self.depth, "AMF3 decode nesting limit exceeded");
            return Err(AmfError::Decode("AMF3 nesting too deep".into()));
        }
        let marker = r.read_u8()?;
        let result = self.decode_value(marker, r);
        if let Err(ref e) = result {
            tracing::debug!(marker, error = %e, "AMF3 decode failed");
        }
        self.depth -= 1;
        result
    }

    fn decode_value(&mut self, marker: u8, r: &mut ByteStream) -> Result<Value> {
        match marker {
            MARKER_UNDEFINED => Ok(Value::Undefined),
            MARKER_NULL => Ok(Value::Null),
            MARKER_FALSE => Ok(Value::Boolean(false)),
            MARKER_TRUE => Ok(Value::Boolean(true)),
            MARKER_INTEGER => self.decode_integer(r),
            MARKER_DOUBLE => Ok(Value::Double(r.read_f64()?)),
            MARKER_STRING => Ok(Value::String(self.read_string(r)?)),
            MARKER_XML_DOC => self.decode_xml(r, true),
            MARKER_DATE => self.decode_date(r),
            MARKER_ARRAY => self.decode_array(r),
            MARKER_OBJECT => self.decode_object(r),
            MARKER_XML => self.decode_xml(r, false),
            MARKER_BYTE_ARRAY => self.decode_byte_array(r),
            other => Err(AmfError::Decode(format!("unknown AMF3 marker 0x{:02X}", other))),
        }
    }

    fn decode_integer(&mut self, r: &mut ByteStream) -> Result<Value> {
        let n = read_header(r, true)?;
        Ok(Value::Integer(n as i32 as i64))
    }

    fn read_string(&mut self, r: &mut ByteStream) -> Result<String> {
        let header = read_header(r, false)?;
        if header & 1 == 0 {
            let idx = header >> 1;
            return self
                .ctx
                .strings
                .get(idx)
                .map(str::to_string)
                .ok_or(AmfError::Reference(idx));
        }
        let len = (header >> 1) as usize;
        if len == 0 {
            return Ok(String::new());
        }
        let s = r.read_utf8(len)?;
        self.ctx.strings.push(s.clone());
        Ok(s)
    }

    fn decode_date(&mut self, r: &mut ByteStream) -> Result<Value> {
        let header = read_header(r, false)?;
        if header & 1 == 0 {
            let idx = header >> 1;
            return self.ctx.objects.get(idx).ok_or(AmfError::Reference(idx));
        }
        let millis = r.read_f64()?;
        let value = Value::Date(millis);
        self.ctx.objects.push(value.clone());
        Ok(value)
    }

    fn decode_xml(&mut self, r: &mut ByteStream, legacy_document: bool) -> Result<Value> {
        let header = read_header(r, false)?;
        if header & 1 == 0 {
            let idx = header >> 1;
            return self.ctx.objects.get(idx).ok_or(AmfError::Reference(idx));
        }
        let len = (header >> 1) as usize;
        let bytes = r.read_bytes(len)?;
        let s = xmlbridge::from_bytes(bytes.as_ref(), self.ctx.forbid_dtd, self.ctx.forbid_entities)?;
        let value = if legacy_document {
            Value::XmlDocument(s)
        } else {
            Value::XmlString(s)
        };
        self.ctx.objects.push(value.clone());
        Ok(value)
    }

    fn decode_array(&mut self, r: &mut ByteStream) -> Result<Value> {
        let header = read_header(r, false)?;
        if header & 1 == 0 {
            let idx = header >> 1;
            return self.ctx.objects.get(idx).ok_or(AmfError::Reference(idx));
        }
        let dense_count = (header >> 1) as usize;
        let first_key = self.read_string(r)?;

        if first_key.is_empty() {
            // Pure dense array: the skeleton is registered before its
            // elements are decoded so a self-referential element resolves
            // to the same `Rc` (spec.md §9 "populate after registering").
            let skeleton = Rc::new(RefCell::new(Vec::with_capacity(dense_count)));
            let value = Value::Array(skeleton.clone());
            self.ctx.objects.push(value.clone());
            for _ in 0..dense_count {
                let v = self.decode(r)?;
                skeleton.borrow_mut().push(v);
            }
            Ok(value)
        } else {
            // Associative part is non-empty: register only a placeholder
            // index, since the final MixedArray isn't built until its
            // entries are read. A self-reference reached from inside this
            // particular shape is out of scope (matches the reference
            // codec's own limitation here).
            let idx = self.ctx.objects.reserve();
            let mut m = MixedArray::new();
            let mut key = first_key;
            loop {
                let v = self.decode(r)?;
                insert_bug_compat(&mut m, key, v);
                key = self.read_string(r)?;
                if key.is_empty() {
                    break;
                }
            }
            for i in 0..dense_count {
                let v = self.decode(r)?;
                m.insert(i as i64, v);
            }
            let value = Value::mixed_array(m);
            self.ctx.objects.fill(idx, value.clone());
            Ok(value)
        }
    }

    fn decode_object(&mut self, r: &mut ByteStream) -> Result<Value> {
        let header = read_header(r, false)?;
        if header & 1 == 0 {
            let idx = header >> 1;
            return self.ctx.objects.get(idx).ok_or(AmfError::Reference(idx));
        }

        let trait_def = if header & 2 == 0 {
            let idx = header >> 2;
            self.ctx.classes.get(idx).ok_or(AmfError::Reference(idx))?
        } else {
            let external = header & 4 != 0;
            let dynamic = header & 8 != 0;
            let sealed_count = (header >> 4) as usize;
            let class_name = self.read_string(r)?;
            let mut sealed_attrs = Vec::with_capacity(sealed_count);
            for _ in 0..sealed_count {
                sealed_attrs.push(self.read_string(r)?);
            }
            let trait_def = CompiledAlias::from_wire(class_name, sealed_attrs, dynamic, external);
            self.ctx.classes.push(trait_def.clone());
            trait_def
        };

        let skeleton = Rc::new(RefCell::new(AmfObject::named(trait_def.type_name.clone())));
        let value = if trait_def.type_name.is_empty() {
            Value::Object(skeleton.clone())
        } else {
            Value::TypedObject(skeleton.clone())
        };
        self.ctx.objects.push(value.clone());

        if trait_def.external {
            let handler = alias::get_externalizable(&trait_def.type_name).ok_or_else(|| {
                AmfError::Decode(format!(
                    "no externalizable handler registered for {:?}",
                    trait_def.type_name
                ))
            })?;
            let decoded = handler.read_external(r, self.ctx)?;
            *skeleton.borrow_mut() = decoded;
            return Ok(value);
        }

        for name in &trait_def.static_attrs {
            let v = self.decode(r)?;
            skeleton.borrow_mut().attrs.insert(name.clone(), v);
        }
        if trait_def.dynamic {
            loop {
                let key = self.read_string(r)?;
                if key.is_empty() {
                    break;
                }
                let v = self.decode(r)?;
                skeleton.borrow_mut().attrs.insert(key, v);
            }
        }
        Ok(value)
    }

    fn decode_byte_array(&mut self, r: &mut ByteStream) -> Result<Value> {
        let header = read_header(r, false)?;
        if header & 1 == 0 {
            let idx = header >> 1;
            return self.ctx.objects.get(idx).ok_or(AmfError::Reference(idx));
        }
        let len = (header >> 1) as usize;
        let raw = r.read_bytes(len)?.to_vec();

        let (data, compressed) = if raw.len() >= 2
            && raw[0] == ZLIB_HEADER[0]
            && (raw[1] == ZLIB_HEADER[1] || raw[1] == ZLIB_HEADER_QUIRK_BYTE)
        {
            let mut normalized = raw.clone();
            normalized[1] = ZLIB_HEADER[1];
            let mut decoder = ZlibDecoder::new(&normalized[..]);
            let mut out = Vec::new();
            match decoder.read_to_end(&mut out) {
                Ok(_) => (out, true),
                Err(_) => (raw, false),
            }
        } else {
            (raw, false)
        };

        let value = Value::ByteArray(Rc::new(RefCell::new(ByteArrayValue { data, compressed })));
        self.ctx.objects.push(value.clone());
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::AliasSpec;

    fn roundtrip(value: &Value) -> Value {
        let mut enc_ctx = Context::new();
        let mut w = ByteWriter::new();
        Amf3Encoder::new(&mut enc_ctx).encode(&mut w, value).unwrap();
        let bytes = w.finish();

        let mut dec_ctx = Context::new();
        let mut r = ByteStream::new(bytes);
        Amf3Decoder::new(&mut dec_ctx).decode(&mut r).unwrap()
    }

    #[test]
    fn concrete_scenario_integer_128() {
        let mut ctx = Context::new();
        let mut w = ByteWriter::new();
        Amf3Encoder::new(&mut ctx).encode(&mut w, &Value::Integer(128)).unwrap();
        assert_eq!(w.finish().as_ref(), &[0x04, 0x81, 0x00]);
    }

    #[test]
    fn concrete_scenario_integer_promotes_past_29_bits() {
        let mut ctx = Context::new();
        let mut w = ByteWriter::new();
        Amf3Encoder::new(&mut ctx)
            .encode(&mut w, &Value::Integer(1 << 28))
            .unwrap();
        let bytes = w.finish();
        assert_eq!(bytes[0], MARKER_DOUBLE);
        assert_eq!(bytes.len(), 9);
    }

    #[test]
    fn concrete_scenario_empty_array() {
        let mut ctx = Context::new();
        let mut w = ByteWriter::new();
        Amf3Encoder::new(&mut ctx).encode(&mut w, &Value::array(vec![])).unwrap();
        assert_eq!(w.finish().as_ref(), &[0x09, 0x01, 0x01]);
    }

    #[test]
    fn concrete_scenario_repeated_string_is_referenced() {
        let mut ctx = Context::new();
        let mut w = ByteWriter::new();
        let mut enc = Amf3Encoder::new(&mut ctx);
        enc.encode(&mut w, &Value::String("foo".into())).unwrap();
        enc.encode(&mut w, &Value::String("foo".into())).unwrap();
        let bytes = w.finish();
        assert_eq!(&bytes[0..5], &[0x06, 0x07, b'f', b'o', b'o']);
        assert_eq!(&bytes[5..7], &[0x06, 0x00]);
    }

    #[test]
    fn scalars_round_trip() {
        for v in [
            Value::Undefined,
            Value::Null,
            Value::Boolean(true),
            Value::Boolean(false),
            Value::Integer(-12345),
            Value::Double(3.5),
            Value::String("hello".into()),
            Value::Date(1_700_000_000_000.0),
        ] {
            assert_eq!(roundtrip(&v), v);
        }
    }

    #[test]
    fn shared_array_reference_is_shorter_than_two_distinct_copies() {
        let mut shared_obj = AmfObject::anonymous();
        shared_obj.attrs.insert("k".into(), Value::Integer(1));
        let shared = Value::object(shared_obj);

        let make_distinct = || {
            let mut o = AmfObject::anonymous();
            o.attrs.insert("k".into(), Value::Integer(1));
            Value::object(o)
        };
        // Two independently allocated `Rc`s, not a clone of one — otherwise
        // this degenerates into the shared case above.
        let distinct_one = make_distinct();
        let distinct_two = make_distinct();

        let mut ctx_shared = Context::new();
        let mut w_shared = ByteWriter::new();
        Amf3Encoder::new(&mut ctx_shared)
            .encode(&mut w_shared, &Value::array(vec![shared.clone(), shared]))
            .unwrap();

        let mut ctx_distinct = Context::new();
        let mut w_distinct = ByteWriter::new();
        Amf3Encoder::new(&mut ctx_distinct)
            .encode(&mut w_distinct, &Value::array(vec![distinct_one, distinct_two]))
            .unwrap();

        assert!(w_shared.len() < w_distinct.len());
    }

    #[test]
    fn self_referential_array_round_trips_without_overflow() {
        let shared = Rc::new(RefCell::new(Vec::new()));
        let value = Value::Array(shared.clone());
        shared.borrow_mut().push(value.clone());

        let mut enc_ctx = Context::new();
        let mut w = ByteWriter::new();
        Amf3Encoder::new(&mut enc_ctx).encode(&mut w, &value).unwrap();
        let bytes = w.finish();

        let mut dec_ctx = Context::new();
        let mut r = ByteStream::new(bytes);
        let decoded = Amf3Decoder::new(&mut dec_ctx).decode(&mut r).unwrap();
        if let Value::Array(a) = &decoded {
            let inner = a.borrow();
            assert_eq!(inner.len(), 1);
            if let Value::Array(inner_ref) = &inner[0] {
                assert!(Rc::ptr_eq(inner_ref, a));
            } else {
                panic!("expected self-referential array element");
            }
        } else {
            panic!("expected array");
        }
    }

    #[test]
    fn mixed_array_dict_edge_case_bug_compat_int_key() {
        // spec.md §8: encoding {'10': 'foo'} decodes with an integer key.
        let mut m = MixedArray::new();
        m.insert("10", Value::String("foo".into()));
        let decoded = roundtrip(&Value::mixed_array(m));
        if let Value::MixedArray(m) = decoded {
            assert_eq!(
                m.borrow().get(&MixedKey::Integer(10)),
                Some(&Value::String("foo".into()))
            );
        } else {
            panic!("expected mixed array");
        }
    }

    #[test]
    fn typed_object_round_trips_static_and_dynamic_attrs() {
        alias::register_class(
            AliasSpec::new("test.amf3.Point")
                .static_attrs(["x", "y"])
                .dynamic(true),
        );

        let mut obj = AmfObject::named("test.amf3.Point");
        obj.attrs.insert("x".into(), Value::Double(1.0));
        obj.attrs.insert("y".into(), Value::Double(2.0));
        obj.attrs.insert("label".into(), Value::String("origin".into()));

        let decoded = roundtrip(&Value::TypedObject(Rc::new(RefCell::new(obj))));
        assert_eq!(decoded.get_f64("x"), Some(1.0));
        assert_eq!(decoded.get_f64("y"), Some(2.0));
        assert_eq!(decoded.get_str("label"), Some("origin".to_string()));
    }

    #[test]
    fn repeated_typed_object_emits_trait_reference() {
        alias::register_class(AliasSpec::new("test.amf3.TraitRef").static_attrs(["a"]).dynamic(false));

        let mut ctx = Context::new();
        let mut w = ByteWriter::new();
        let mut enc = Amf3Encoder::new(&mut ctx);

        let mut first = AmfObject::named("test.amf3.TraitRef");
        first.attrs.insert("a".into(), Value::Integer(1));
        let mut second = AmfObject::named("test.amf3.TraitRef");
        second.attrs.insert("a".into(), Value::Integer(2));

        // Both values must stay alive simultaneously: if the first `Rc` is
        // dropped before the second is allocated, the allocator can reuse
        // its address and falsely trigger object-identity dedup.
        let first = Value::TypedObject(Rc::new(RefCell::new(first)));
        let second = Value::TypedObject(Rc::new(RefCell::new(second)));
        enc.encode(&mut w, &first).unwrap();
        enc.encode(&mut w, &second).unwrap();

        let bytes = w.finish();
        // second object's trait header: R=1,T=0 (ref), class index 0 -> (0<<2)|0b01 = 0x01
        let second_marker_pos = bytes
            .iter()
            .rposition(|&b| b == MARKER_OBJECT)
            .expect("second object marker");
        assert_eq!(bytes[second_marker_pos + 1], 0x01);
    }

    #[test]
    fn externalizable_round_trips_through_registered_handler() {
        use crate::alias::{AliasSpec, Externalizable};

        struct FixedPoint;
        impl Externalizable for FixedPoint {
            fn write_external(&self, obj: &AmfObject, w: &mut ByteWriter, ctx: &mut Context) -> Result<()> {
                let x = obj.attrs.get("x").and_then(Value::as_f64).unwrap_or(0.0);
                let y = obj.attrs.get("y").and_then(Value::as_f64).unwrap_or(0.0);
                w.write_f64(x);
                w.write_f64(y);
                let _ = ctx;
                Ok(())
            }

            fn read_external(&self, r: &mut ByteStream, ctx: &mut Context) -> Result<AmfObject> {
                let x = r.read_f64()?;
                let y = r.read_f64()?;
                let mut obj = AmfObject::named("test.amf3.FixedPoint");
                obj.attrs.insert("x".into(), Value::Double(x));
                obj.attrs.insert("y".into(), Value::Double(y));
                let _ = ctx;
                Ok(obj)
            }
        }

        alias::register_class(
            AliasSpec::new("test.amf3.FixedPoint")
                .external(true)
                .dynamic(true),
        );
        alias::register_externalizable("test.amf3.FixedPoint", Arc::new(FixedPoint));

        // Registering a type both `external` and `dynamic` must not produce
        // a trait header with both bits set: `external` wins.
        let compiled = alias::get_class_alias("test.amf3.FixedPoint").unwrap();
        assert!(compiled.external);
        assert!(!compiled.dynamic);

        let mut obj = AmfObject::named("test.amf3.FixedPoint");
        obj.attrs.insert("x".into(), Value::Double(3.5));
        obj.attrs.insert("y".into(), Value::Double(-2.0));

        let decoded = roundtrip(&Value::TypedObject(Rc::new(RefCell::new(obj))));
        assert_eq!(decoded.get_f64("x"), Some(3.5));
        assert_eq!(decoded.get_f64("y"), Some(-2.0));
    }

    #[test]
    fn compressed_byte_array_round_trips_with_quirk_byte() {
        let mut ba = ByteArrayValue::new(b"hello world, compress me".to_vec());
        ba.compressed = true;
        let value = Value::ByteArray(Rc::new(RefCell::new(ba)));

        let mut enc_ctx = Context::new();
        let mut w = ByteWriter::new();
        Amf3Encoder::new(&mut enc_ctx).encode(&mut w, &value).unwrap();
        let bytes = w.finish();
        // header byte, length header byte(s), then zlib bytes with the quirk applied.
        assert_eq!(bytes[2], ZLIB_HEADER[0]);
        assert_eq!(bytes[3], ZLIB_HEADER_QUIRK_BYTE);

        let mut dec_ctx = Context::new();
        let mut r = ByteStream::new(bytes);
        let decoded = Amf3Decoder::new(&mut dec_ctx).decode(&mut r).unwrap();
        if let Value::ByteArray(b) = decoded {
            let b = b.borrow();
            assert!(b.compressed);
            assert_eq!(b.data, b"hello world, compress me");
        } else {
            panic!("expected byte array");
        }
    }

    #[test]
    fn xml_document_and_xml_string_round_trip_distinctly() {
        let doc = Value::XmlDocument("<a/>".into());
        let s = Value::XmlString("<b/>".into());
        assert!(matches!(roundtrip(&doc), Value::XmlDocument(x) if x == "<a/>"));
        assert!(matches!(roundtrip(&s), Value::XmlString(x) if x == "<b/>"));
    }
}
