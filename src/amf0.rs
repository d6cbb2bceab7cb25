//! AMF0 encoder and decoder
//!
//! AMF0 is the original Action Message Format. It has a flat object wire
//! format (no static/dynamic split) and a 16-bit-indexed reference table
//! shared across Object/MixedArray/StrictArray/TypedObject values.
//!
//! Type Markers:
//! ```text
//! 0x00 - Number (IEEE 754 double)
//! 0x01 - Boolean
//! 0x02 - String (UTF-8, 16-bit length prefix)
//! 0x03 - Object (key-value pairs until 0x000009)
//! 0x04 - MovieClip (reserved, not supported)
//! 0x05 - Null
//! 0x06 - Undefined
//! 0x07 - Reference (16-bit index)
//! 0x08 - ECMA Array (associative array)
//! 0x09 - Object End (0x000009 sequence)
//! 0x0A - Strict Array (dense array)
//! 0x0B - Date (double + timezone)
//! 0x0C - Long String (UTF-8, 32-bit length prefix)
//! 0x0D - Unsupported
//! 0x0E - RecordSet (reserved, not supported)
//! 0x0F - XML Document
//! 0x10 - Typed Object (class name + properties)
//! 0x11 - AVM+ (switch to AMF3)
//! ```

use crate::alias::{self, CompiledAlias};
use crate::amf3::{Amf3Decoder, Amf3Encoder};
use crate::bytestream::{ByteStream, ByteWriter};
use crate::context::Context;
use crate::error::{AmfError, Result};
use crate::value::{AmfObject, MixedArray, Value};
use crate::xmlbridge;

const MARKER_NUMBER: u8 = 0x00;
const MARKER_BOOLEAN: u8 = 0x01;
const MARKER_STRING: u8 = 0x02;
const MARKER_OBJECT: u8 = 0x03;
const MARKER_MOVIECLIP: u8 = 0x04;
const MARKER_NULL: u8 = 0x05;
const MARKER_UNDEFINED: u8 = 0x06;
const MARKER_REFERENCE: u8 = 0x07;
const MARKER_ECMA_ARRAY: u8 = 0x08;
const MARKER_OBJECT_END: u8 = 0x09;
const MARKER_STRICT_ARRAY: u8 = 0x0A;
const MARKER_DATE: u8 = 0x0B;
const MARKER_LONG_STRING: u8 = 0x0C;
const MARKER_UNSUPPORTED: u8 = 0x0D;
const MARKER_RECORDSET: u8 = 0x0E;
const MARKER_XML_DOCUMENT: u8 = 0x0F;
const MARKER_TYPED_OBJECT: u8 = 0x10;
const MARKER_AVMPLUS: u8 = 0x11;

pub struct Amf0Encoder<'c> {
    ctx: &'c mut Context,
    depth: usize,
}

impl<'c> Amf0Encoder<'c> {
    pub fn new(ctx: &'c mut Context) -> Self {
        Self { ctx, depth: 0 }
    }

    pub fn encode(&mut self, w: &mut ByteWriter, value: &Value) -> Result<()> {
        self.depth += 1;
        if self.depth > self.ctx.max_depth {
            self.depth -= 1;
            tracing::warn!(depth = self.depth, "AMF0 encode nesting limit exceeded");
            return Err(AmfError::Encode("AMF0 nesting too deep".into()));
        }
        if self.depth == 1 {
            tracing::debug!(variant = value.type_name(), "encoding AMF0 value");
        }
        let result = self.encode_value(w, value);
        self.depth -= 1;
        result
    }

    fn encode_value(&mut self, w: &mut ByteWriter, value: &Value) -> Result<()> {
        match value {
            Value::Undefined => w.write_u8(MARKER_UNDEFINED),
            Value::Null => w.write_u8(MARKER_NULL),
            Value::Boolean(b) => {
                w.write_u8(MARKER_BOOLEAN);
                w.write_u8(if *b { 1 } else { 0 });
            }
            Value::Integer(i) => {
                w.write_u8(MARKER_NUMBER);
                w.write_f64(*i as f64);
            }
            Value::Double(n) => {
                w.write_u8(MARKER_NUMBER);
                w.write_f64(*n);
            }
            Value::ByteString(bytes) => {
                self.write_string(w, &String::from_utf8_lossy(bytes));
            }
            Value::String(s) => self.write_string(w, s),
            Value::Date(millis) => {
                w.write_u8(MARKER_DATE);
                w.write_f64(*millis);
                w.write_i16(0);
            }
            Value::Array(_) => self.encode_strict_array(w, value)?,
            Value::MixedArray(_) => self.encode_ecma_array(w, value)?,
            Value::Object(_) | Value::TypedObject(_) => self.encode_object(w, value)?,
            Value::XmlDocument(s) | Value::XmlString(s) => {
                xmlbridge::from_bytes(s.as_bytes(), self.ctx.forbid_dtd, self.ctx.forbid_entities)?;
                let bytes = xmlbridge::to_bytes(s);
                w.write_u8(MARKER_XML_DOCUMENT);
                w.write_u32(bytes.len() as u32);
                w.write_bytes(&bytes);
            }
            Value::ByteArray(_) => {
                // ByteArray is AMF3-only; a bare AMF0 stream has no tag for
                // it, so it travels as an AVM+ switch to the AMF3 codec.
                w.write_u8(MARKER_AVMPLUS);
                let mut sub_ctx = Context::new();
                Amf3Encoder::new(&mut sub_ctx).encode(w, value)?;
            }
        }
        Ok(())
    }

    fn write_string(&mut self, w: &mut ByteWriter, s: &str) {
        if s.len() > 0xFFFF {
            w.write_u8(MARKER_LONG_STRING);
            w.write_u32(s.len() as u32);
        } else {
            w.write_u8(MARKER_STRING);
            w.write_u16(s.len() as u16);
        }
        w.write_bytes(s.as_bytes());
    }

    fn write_key(&mut self, w: &mut ByteWriter, s: &str) {
        w.write_u16(s.len() as u16);
        w.write_bytes(s.as_bytes());
    }

    fn encode_strict_array(&mut self, w: &mut ByteWriter, value: &Value) -> Result<()> {
        if let Some(idx) = self.ctx.objects.reference_or_register(value) {
            w.write_u8(MARKER_REFERENCE);
            w.write_u16(idx as u16);
            return Ok(());
        }
        let items = match value {
            Value::Array(items) => items.clone(),
            _ => unreachable!("encode_strict_array called on non-array Value"),
        };
        let items = items.borrow();
        w.write_u8(MARKER_STRICT_ARRAY);
        w.write_u32(items.len() as u32);
        for item in items.iter() {
            self.encode(w, item)?;
        }
        Ok(())
    }

    fn encode_ecma_array(&mut self, w: &mut ByteWriter, value: &Value) -> Result<()> {
        if let Some(idx) = self.ctx.objects.reference_or_register(value) {
            w.write_u8(MARKER_REFERENCE);
            w.write_u16(idx as u16);
            return Ok(());
        }
        let m = match value {
            Value::MixedArray(m) => m.clone(),
            _ => unreachable!("encode_ecma_array called on non-mixed-array Value"),
        };
        let m = m.borrow();
        w.write_u8(MARKER_ECMA_ARRAY);
        w.write_u32(m.len() as u32);
        for (key, val) in m.iter() {
            let key_str = match key {
                crate::value::MixedKey::Integer(i) => i.to_string(),
                crate::value::MixedKey::String(s) => s.clone(),
            };
            self.write_key(w, &key_str);
            self.encode(w, val)?;
        }
        self.write_key(w, "");
        w.write_u8(MARKER_OBJECT_END);
        Ok(())
    }

    fn resolve_alias(&self, obj: &AmfObject) -> Option<std::sync::Arc<CompiledAlias>> {
        if obj.is_anonymous() || !alias::has_alias(&obj.class_name) {
            return None;
        }
        alias::get_class_alias(&obj.class_name).ok()
    }

    fn encode_object(&mut self, w: &mut ByteWriter, value: &Value) -> Result<()> {
        if let Some(idx) = self.ctx.objects.reference_or_register(value) {
            w.write_u8(MARKER_REFERENCE);
            w.write_u16(idx as u16);
            return Ok(());
        }
        let obj_rc = match value {
            Value::Object(o) | Value::TypedObject(o) => o.clone(),
            _ => unreachable!("encode_object called on non-object Value"),
        };
        let obj = obj_rc.borrow();
        let alias = self.resolve_alias(&obj);

        if let Some(a) = &alias {
            if a.amf3_only {
                w.write_u8(MARKER_AVMPLUS);
                let mut sub_ctx = Context::new();
                Amf3Encoder::new(&mut sub_ctx).encode(w, value)?;
                return Ok(());
            }
        }

        let attrs: Vec<(String, Value)> = match &alias {
            Some(a) => a.encodable_attrs(&obj),
            None => obj.attrs.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        };

        if obj.is_anonymous() {
            w.write_u8(MARKER_OBJECT);
        } else {
            w.write_u8(MARKER_TYPED_OBJECT);
            self.write_key(w, &obj.class_name);
        }
        for (key, val) in &attrs {
            self.write_key(w, key);
            self.encode(w, val)?;
        }
        self.write_key(w, "");
        w.write_u8(MARKER_OBJECT_END);
        Ok(())
    }
}

pub struct Amf0Decoder<'c> {
    ctx: &'c mut Context,
    lenient: bool,
    depth: usize,
}

impl<'c> Amf0Decoder<'c> {
    pub fn new(ctx: &'c mut Context) -> Self {
        Self {
            ctx,
            lenient: true,
            depth: 0,
        }
    }

    pub fn with_lenient(ctx: &'c mut Context, lenient: bool) -> Self {
        Self {
            ctx,
            lenient,
            depth: 0,
        }
    }

    pub fn decode(&mut self, r: &mut ByteStream) -> Result<Value> {
        self.depth += 1;
        if self.depth > self.ctx.max_depth {
            self.depth -= 1;
            tracing::warn!(depth = self.depth, "AMF0 decode nesting limit exceeded");
            return Err(AmfError::Decode("AMF0 nesting too deep".into()));
        }
        let marker = r.read_u8()?;
        let result = self.decode_value(marker, r);
        if let Err(ref e) = result {
            tracing::debug!(marker, error = %e, "AMF0 decode failed");
        }
        self.depth -= 1;
        result
    }

    fn decode_value(&mut self, marker: u8, r: &mut ByteStream) -> Result<Value> {
        match marker {
            MARKER_NUMBER => Ok(Value::Double(r.read_f64()?)),
            MARKER_BOOLEAN => Ok(Value::Boolean(r.read_u8()? != 0)),
            MARKER_STRING => Ok(Value::String(self.read_utf8(r)?)),
            MARKER_OBJECT => self.decode_object(r, String::new()),
            MARKER_MOVIECLIP => Err(AmfError::Unsupported("MovieClip")),
            MARKER_NULL => Ok(Value::Null),
            MARKER_UNDEFINED => Ok(Value::Undefined),
            MARKER_REFERENCE => self.decode_reference(r),
            MARKER_ECMA_ARRAY => self.decode_ecma_array(r),
            MARKER_STRICT_ARRAY => self.decode_strict_array(r),
            MARKER_DATE => self.decode_date(r),
            MARKER_LONG_STRING => Ok(Value::String(self.read_utf8_long(r)?)),
            MARKER_UNSUPPORTED => Ok(Value::Undefined),
            MARKER_RECORDSET => Err(AmfError::Unsupported("RecordSet")),
            MARKER_XML_DOCUMENT => self.decode_xml(r),
            MARKER_TYPED_OBJECT => {
                let class_name = self.read_utf8(r)?;
                self.decode_object(r, class_name)
            }
            MARKER_AVMPLUS => {
                let mut sub_ctx = Context::new();
                Amf3Decoder::new(&mut sub_ctx).decode(r)
            }
            other => {
                if self.lenient {
                    Ok(Value::Undefined)
                } else {
                    Err(AmfError::Decode(format!("unknown AMF0 marker 0x{:02X}", other)))
                }
            }
        }
    }

    fn read_utf8(&mut self, r: &mut ByteStream) -> Result<String> {
        let len = r.read_u16()? as usize;
        r.read_utf8(len)
    }

    fn read_utf8_long(&mut self, r: &mut ByteStream) -> Result<String> {
        let len = r.read_u32()? as usize;
        r.read_utf8(len)
    }

    /// Reads (key, value) pairs until the empty-key end marker, tolerating
    /// encoders that omit the 0x09 terminator at end-of-stream in lenient
    /// mode.
    fn read_property_list(&mut self, r: &mut ByteStream) -> Result<Vec<(String, Value)>> {
        let mut out = Vec::new();
        loop {
            let key = self.read_utf8(r)?;
            if key.is_empty() {
                if r.is_empty() {
                    if self.lenient {
                        break;
                    }
                    return Err(AmfError::EndOfStream);
                }
                let end_marker = r.read_u8()?;
                if end_marker == MARKER_OBJECT_END || self.lenient {
                    break;
                }
                return Err(AmfError::Decode("expected object-end marker".into()));
            }
            let value = self.decode(r)?;
            out.push((key, value));
        }
        Ok(out)
    }

    fn decode_object(&mut self, r: &mut ByteStream, class_name: String) -> Result<Value> {
        let idx = self.ctx.objects.reserve();
        let props = self.read_property_list(r)?;

        let value = if class_name.is_empty() {
            let mut obj = AmfObject::anonymous();
            for (k, v) in props {
                obj.attrs.insert(k, v);
            }
            Value::object(obj)
        } else if alias::has_alias(&class_name) {
            let compiled = alias::get_class_alias(&class_name)?;
            let mut wire_attrs = crate::value::AttrMap::new();
            for (k, v) in props {
                wire_attrs.insert(k, v);
            }
            let decoded_attrs = compiled.decodable_attrs(&wire_attrs)?;
            let mut obj = compiled.create_instance();
            compiled.apply_attributes(&mut obj, decoded_attrs);
            Value::TypedObject(std::rc::Rc::new(std::cell::RefCell::new(obj)))
        } else {
            let mut obj = AmfObject::named(class_name);
            for (k, v) in props {
                obj.attrs.insert(k, v);
            }
            Value::TypedObject(std::rc::Rc::new(std::cell::RefCell::new(obj)))
        };
        self.ctx.objects.fill(idx, value.clone());
        Ok(value)
    }

    fn decode_ecma_array(&mut self, r: &mut ByteStream) -> Result<Value> {
        let _count_hint = r.read_u32()?;
        let idx = self.ctx.objects.reserve();
        let props = self.read_property_list(r)?;

        let mut m = MixedArray::new();
        for (k, v) in props {
            if let Ok(n) = k.parse::<i64>() {
                if n.to_string() == k {
                    m.insert(n, v);
                    continue;
                }
            }
            m.insert(k, v);
        }
        let value = Value::mixed_array(m);
        self.ctx.objects.fill(idx, value.clone());
        Ok(value)
    }

    fn decode_strict_array(&mut self, r: &mut ByteStream) -> Result<Value> {
        let count = r.read_u32()? as usize;
        let idx = self.ctx.objects.reserve();
        let mut elements = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            elements.push(self.decode(r)?);
        }
        let value = Value::array(elements);
        self.ctx.objects.fill(idx, value.clone());
        Ok(value)
    }

    fn decode_date(&mut self, r: &mut ByteStream) -> Result<Value> {
        let millis = r.read_f64()?;
        let _timezone = r.read_i16()?;
        Ok(Value::Date(millis))
    }

    fn decode_xml(&mut self, r: &mut ByteStream) -> Result<Value> {
        let len = r.read_u32()? as usize;
        let bytes = r.read_bytes(len)?;
        let s = xmlbridge::from_bytes(bytes.as_ref(), self.ctx.forbid_dtd, self.ctx.forbid_entities)?;
        Ok(Value::XmlDocument(s))
    }

    fn decode_reference(&mut self, r: &mut ByteStream) -> Result<Value> {
        let index = r.read_u16()? as u32;
        self.ctx.objects.get(index).ok_or(AmfError::Reference(index))
    }
}
