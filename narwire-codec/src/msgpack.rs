// SPDX-FileCopyrightText: 2025 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! msgpack with binary-keyed `{b"swhtype": tag, b"d": payload}` envelopes.
//!
//! Integers outside the native 64-bit range travel as ext type 1 (positive)
//! or 2 (negative) holding the big-endian magnitude. Decoding works bottom
//! up: maps are rebuilt innermost first, so a decoder sees an
//! already-decoded payload.

use std::collections::BTreeMap;

use num_bigint::{BigInt, Sign};
use tracing::trace;

use crate::builtin;
use crate::error::{CodecError, Result};
use crate::table::{DecoderTable, EncoderTable};
use crate::value::Value;
use crate::{D_KEY, MAX_DEPTH, SWHTYPE_KEY, nested};

pub const EXT_LONG_INT: i8 = 1;
pub const EXT_LONG_NEG_INT: i8 = 2;

type LegacyDecodeFn = fn(Value) -> Result<Value>;

/// Maps flagged by one of these keys carry their value under `s`.
const LEGACY: &[(&str, LegacyDecodeFn)] = &[
    ("__datetime__", builtin::decode_datetime),
    ("__uuid__", builtin::decode_uuid),
    ("__timedelta__", builtin::decode_timedelta),
    ("__arrow__", builtin::decode_arrow),
];

fn int(i: &BigInt) -> rmpv::Value {
    if let Ok(v) = i64::try_from(i) {
        rmpv::Value::Integer(v.into())
    } else if let Ok(v) = u64::try_from(i) {
        rmpv::Value::Integer(v.into())
    } else {
        let (sign, magnitude) = i.to_bytes_be();
        let code = if sign == Sign::Minus {
            EXT_LONG_NEG_INT
        } else {
            EXT_LONG_INT
        };
        rmpv::Value::Ext(code, magnitude)
    }
}

fn to_msgpack(value: &Value, encoders: &EncoderTable, depth: usize) -> Result<rmpv::Value> {
    let list = |items: &[Value]| -> Result<rmpv::Value> {
        let depth = nested(depth)?;
        items
            .iter()
            .map(|item| to_msgpack(item, encoders, depth))
            .collect::<Result<_>>()
            .map(rmpv::Value::Array)
    };
    Ok(match value {
        Value::Null => rmpv::Value::Nil,
        Value::Bool(b) => rmpv::Value::Boolean(*b),
        Value::Int(i) => int(i),
        Value::Float(f) => rmpv::Value::F64(*f),
        Value::String(s) => rmpv::Value::String(s.clone().into()),
        Value::Bytes(b) => rmpv::Value::Binary(b.clone()),
        Value::List(items) => list(items)?,
        Value::Map(map) => {
            let depth = nested(depth)?;
            rmpv::Value::Map(
                map.iter()
                    .map(|(k, v)| {
                        Ok((
                            rmpv::Value::String(k.clone().into()),
                            to_msgpack(v, encoders, depth)?,
                        ))
                    })
                    .collect::<Result<_>>()?,
            )
        }
        Value::Generator(generator) => list(&generator.materialize())?,
        other => {
            let encoder = encoders
                .find(other)
                .ok_or(CodecError::Unserializable(other.type_name()))?;
            trace!(tag = encoder.tag(), "encoding envelope");
            let payload = to_msgpack(&encoder.encode(other)?, encoders, nested(depth)?)?;
            rmpv::Value::Map(vec![
                (
                    rmpv::Value::Binary(SWHTYPE_KEY.as_bytes().to_vec()),
                    rmpv::Value::String(encoder.tag().into()),
                ),
                (rmpv::Value::Binary(D_KEY.as_bytes().to_vec()), payload),
            ])
        }
    })
}

pub(crate) fn encode(value: &Value, encoders: &EncoderTable) -> Result<Vec<u8>> {
    let packed = to_msgpack(value, encoders, 0)?;
    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, &packed)?;
    Ok(buf)
}

enum Key {
    Str(String),
    Bin(String),
}

impl Key {
    fn is_bin(&self, name: &str) -> bool {
        matches!(self, Key::Bin(key) if key == name)
    }

    fn into_string(self) -> String {
        match self {
            Key::Str(key) | Key::Bin(key) => key,
        }
    }
}

fn utf8(s: rmpv::Utf8String) -> Result<String> {
    s.into_str()
        .ok_or_else(|| CodecError::invalid_payload("string", "invalid UTF-8"))
}

fn ext(code: i8, data: &[u8]) -> Result<Value> {
    match code {
        EXT_LONG_INT => Ok(Value::Int(BigInt::from_bytes_be(Sign::Plus, data))),
        EXT_LONG_NEG_INT => Ok(Value::Int(BigInt::from_bytes_be(Sign::Minus, data))),
        code => Err(CodecError::UnknownExtCode(code)),
    }
}

fn take_bin(entries: &mut Vec<(Key, Value)>, name: &str) -> Option<Value> {
    let index = entries.iter().position(|(key, _)| key.is_bin(name))?;
    Some(entries.swap_remove(index).1)
}

fn find<'a>(entries: &'a [(Key, Value)], name: &str) -> Option<&'a Value> {
    entries
        .iter()
        .find_map(|(key, value)| key.is_bin(name).then_some(value))
}

fn decode_map(mut entries: Vec<(Key, Value)>, decoders: &DecoderTable) -> Result<Value> {
    if entries.len() == 2 {
        let decoder = match (find(&entries, SWHTYPE_KEY), find(&entries, D_KEY)) {
            (Some(Value::String(tag)), Some(_)) => decoders.get(tag),
            _ => None,
        };
        if let Some(decoder) = decoder {
            let payload = take_bin(&mut entries, D_KEY).unwrap_or(Value::Null);
            return decoder.decode(payload);
        }
    }

    for (flag, decode) in LEGACY {
        if find(&entries, flag).is_some_and(Value::is_truthy) {
            trace!(flag, "decoding legacy encoding");
            let payload = take_bin(&mut entries, "s")
                .ok_or_else(|| CodecError::invalid_payload(flag, "missing `s` field"))?;
            return decode(payload);
        }
    }

    Ok(Value::Map(
        entries
            .into_iter()
            .map(|(key, value)| (key.into_string(), value))
            .collect::<BTreeMap<_, _>>(),
    ))
}

fn from_msgpack(value: rmpv::Value, decoders: &DecoderTable, depth: usize) -> Result<Value> {
    Ok(match value {
        rmpv::Value::Nil => Value::Null,
        rmpv::Value::Boolean(b) => Value::Bool(b),
        rmpv::Value::Integer(i) => match (i.as_i64(), i.as_u64()) {
            (Some(v), _) => Value::from(v),
            (None, Some(v)) => Value::from(v),
            (None, None) => return Err(CodecError::invalid_payload("int", i.to_string())),
        },
        rmpv::Value::F32(f) => Value::Float(f64::from(f)),
        rmpv::Value::F64(f) => Value::Float(f),
        rmpv::Value::String(s) => Value::String(utf8(s)?),
        rmpv::Value::Binary(b) => Value::Bytes(b),
        rmpv::Value::Array(items) => {
            let depth = nested(depth)?;
            Value::List(
                items
                    .into_iter()
                    .map(|item| from_msgpack(item, decoders, depth))
                    .collect::<Result<_>>()?,
            )
        }
        rmpv::Value::Map(pairs) => {
            let depth = nested(depth)?;
            let mut entries = Vec::with_capacity(pairs.len());
            for (key, value) in pairs {
                let key = match key {
                    rmpv::Value::String(s) => Key::Str(utf8(s)?),
                    rmpv::Value::Binary(b) => Key::Bin(
                        String::from_utf8(b)
                            .map_err(|_| CodecError::InvalidMapKey("non UTF-8 bytes".into()))?,
                    ),
                    other => return Err(CodecError::InvalidMapKey(other.to_string())),
                };
                entries.push((key, from_msgpack(value, decoders, depth)?));
            }
            decode_map(entries, decoders)?
        }
        rmpv::Value::Ext(code, data) => ext(code, &data)?,
    })
}

pub(crate) fn decode(data: &[u8], decoders: &DecoderTable) -> Result<Value> {
    let mut reader = data;
    // The reader spends two levels per container and up to three on a leaf
    let value = rmpv::decode::read_value_with_max_depth(&mut reader, 2 * MAX_DEPTH + 3)?;
    if !reader.is_empty() {
        return Err(CodecError::TrailingBytes(reader.len()));
    }
    from_msgpack(value, decoders, 0)
}
