//! Local Shared Object (LSO / `.sol`) container framing
//!
//! A `.sol` file frames a flat sequence of named AMF values under a root
//! name, with an encoding selector choosing whether each value (and its
//! name) is written in AMF0 or AMF3 form. Grounded on the upstream
//! `sol.py` byte layout (spec.md §4.6/§6).

use crate::amf0::{Amf0Decoder, Amf0Encoder};
use crate::amf3::{Amf3Decoder, Amf3Encoder};
use crate::bytestream::{ByteStream, ByteWriter};
use crate::context::Context;
use crate::error::{AmfError, Result};
use crate::value::Value;
use crate::vlq;

const HEADER_VERSION: [u8; 2] = [0x00, 0xBF];
const HEADER_SIGNATURE: &[u8] = b"TCSO\x00\x04\x00\x00\x00\x00";
const PADDING: u8 = 0x00;

/// Which wire encoding a SOL body uses for its name/value pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolEncoding {
    Amf0,
    Amf3,
}

impl SolEncoding {
    fn selector(self) -> u8 {
        match self {
            SolEncoding::Amf0 => 0,
            SolEncoding::Amf3 => 3,
        }
    }

    fn from_selector(b: u8) -> Result<Self> {
        match b {
            0 => Ok(SolEncoding::Amf0),
            3 => Ok(SolEncoding::Amf3),
            other => Err(AmfError::Decode(format!("unknown SOL encoding selector {}", other))),
        }
    }
}

/// An in-memory Local Shared Object: a root name plus ordered name/value
/// pairs (spec.md glossary "LSO").
#[derive(Debug, Clone, Default)]
pub struct Sol {
    pub name: String,
    pub entries: Vec<(String, Value)>,
}

impl Sol {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.entries.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }
}

fn write_name(w: &mut ByteWriter, encoding: SolEncoding, name: &str) {
    match encoding {
        SolEncoding::Amf0 => {
            w.write_u16(name.len() as u16);
            w.write_bytes(name.as_bytes());
        }
        SolEncoding::Amf3 => {
            w.write_bytes(&vlq::encode_u29_raw(((name.len() as u32) << 1) | 1));
            w.write_bytes(name.as_bytes());
        }
    }
}

fn read_name(r: &mut ByteStream, encoding: SolEncoding) -> Result<String> {
    match encoding {
        SolEncoding::Amf0 => {
            let len = r.read_u16()? as usize;
            r.read_utf8(len)
        }
        SolEncoding::Amf3 => {
            let n = r.remaining().min(4);
            let peeked = r.peek(n)?;
            let (header, consumed) = vlq::decode_u29(&peeked, false)?;
            r.seek(r.position() + consumed);
            let len = (header >> 1) as usize;
            r.read_utf8(len)
        }
    }
}

/// Encodes `sol` into `.sol`-file bytes (spec.md §4.6 "Encode").
pub fn encode(sol: &Sol, encoding: SolEncoding) -> Result<Vec<u8>> {
    let mut w = ByteWriter::new();
    w.write_bytes(&HEADER_VERSION);
    let length_pos = w.len();
    w.write_u32(0);
    w.write_bytes(HEADER_SIGNATURE);
    write_name(&mut w, SolEncoding::Amf0, &sol.name);
    w.write_bytes(&[PADDING, PADDING, PADDING]);
    w.write_u8(encoding.selector());

    let mut ctx = Context::new();
    for (name, value) in &sol.entries {
        write_name(&mut w, encoding, name);
        match encoding {
            SolEncoding::Amf0 => Amf0Encoder::new(&mut ctx).encode(&mut w, value)?,
            SolEncoding::Amf3 => Amf3Encoder::new(&mut ctx).encode(&mut w, value)?,
        }
        w.write_u8(PADDING);
    }

    let total_len = (w.len() - length_pos - 4) as u32;
    w.patch_u32_at(length_pos, total_len);
    tracing::info!(name = %sol.name, entries = sol.entries.len(), "encoded SOL container");
    Ok(w.finish().to_vec())
}

/// Decodes `.sol`-file bytes into a [`Sol`] (spec.md §4.6 "Decode").
pub fn decode(data: &[u8]) -> Result<Sol> {
    let mut r = ByteStream::new(data.to_vec());

    if !r.consume_prefix(&HEADER_VERSION) {
        return Err(AmfError::Decode("unknown SOL header version".into()));
    }
    let declared_len = r.read_u32()? as usize;
    if declared_len != r.remaining() {
        return Err(AmfError::Decode("inconsistent SOL header length".into()));
    }
    if !r.consume_prefix(HEADER_SIGNATURE) {
        return Err(AmfError::Decode("invalid SOL signature".into()));
    }

    let root_name = read_name(&mut r, SolEncoding::Amf0)?;
    if r.read_bytes(3)?.as_ref() != [PADDING, PADDING, PADDING] {
        return Err(AmfError::Decode("invalid SOL padding".into()));
    }
    let encoding = SolEncoding::from_selector(r.read_u8()?)?;

    let mut sol = Sol::new(root_name);
    let mut ctx = Context::new();
    while r.has_remaining() {
        let name = read_name(&mut r, encoding)?;
        let value = match encoding {
            SolEncoding::Amf0 => Amf0Decoder::new(&mut ctx).decode(&mut r)?,
            SolEncoding::Amf3 => Amf3Decoder::new(&mut ctx).decode(&mut r)?,
        };
        if r.read_u8()? != PADDING {
            return Err(AmfError::Decode("missing SOL entry padding byte".into()));
        }
        sol.insert(name, value);
    }
    tracing::info!(name = %sol.name, entries = sol.entries.len(), "decoded SOL container");
    Ok(sol)
}
