// SPDX-FileCopyrightText: 2025 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! JSON with `{"swhtype": tag, "d": payload}` envelopes.
//!
//! Integers keep their full precision. Decoding walks the document from
//! the root down: an envelope's payload is decoded before its own decoder
//! runs, and `bytes` envelopes are always understood since JSON has no
//! other way to carry bytes.

use std::str::FromStr as _;

use narwire_utils_base_encoding::base85;
use num_bigint::BigInt;
use serde_json::{Map, Number};
use tracing::trace;

use crate::error::{CodecError, Result};
use crate::table::{DecoderTable, EncoderTable};
use crate::value::Value;
use crate::{D_KEY, SWHTYPE_KEY, nested};

fn to_json(value: &Value, encoders: &EncoderTable, depth: usize) -> Result<serde_json::Value> {
    let list = |items: &[Value]| -> Result<serde_json::Value> {
        let depth = nested(depth)?;
        items
            .iter()
            .map(|item| to_json(item, encoders, depth))
            .collect::<Result<_>>()
            .map(serde_json::Value::Array)
    };
    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::Number(Number::from_str(&i.to_string())?),
        Value::Float(f) => {
            serde_json::Value::Number(Number::from_f64(*f).ok_or(CodecError::NonFiniteFloat(*f))?)
        }
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::List(items) => list(items)?,
        Value::Map(map) => {
            let depth = nested(depth)?;
            serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), to_json(v, encoders, depth)?)))
                    .collect::<Result<Map<_, _>>>()?,
            )
        }
        other => {
            if let Some(encoder) = encoders.find(other) {
                trace!(tag = encoder.tag(), "encoding envelope");
                let payload = to_json(&encoder.encode(other)?, encoders, nested(depth)?)?;
                let mut envelope = Map::new();
                envelope.insert(SWHTYPE_KEY.to_owned(), encoder.tag().into());
                envelope.insert(D_KEY.to_owned(), payload);
                serde_json::Value::Object(envelope)
            } else if let Value::Generator(generator) = other {
                list(&generator.materialize())?
            } else if let Some(items) = match other {
                Value::Extension(ext) => ext.iterate(),
                _ => None,
            } {
                list(&items)?
            } else {
                return Err(CodecError::Unserializable(other.type_name()));
            }
        }
    })
}

pub(crate) fn encode(value: &Value, encoders: &EncoderTable) -> Result<String> {
    Ok(serde_json::to_string(&to_json(value, encoders, 0)?)?)
}

fn number(n: &Number) -> Result<Value> {
    let text = n.to_string();
    if text.contains(['.', 'e', 'E']) {
        text.parse::<f64>()
            .map(Value::Float)
            .map_err(|e| CodecError::invalid_payload("float", e.to_string()))
    } else {
        BigInt::from_str(&text)
            .map(Value::Int)
            .map_err(|e| CodecError::invalid_payload("int", e.to_string()))
    }
}

fn from_json(json: serde_json::Value, decoders: &DecoderTable, depth: usize) -> Result<Value> {
    Ok(match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => number(&n)?,
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => {
            let depth = nested(depth)?;
            Value::List(
                items
                    .into_iter()
                    .map(|item| from_json(item, decoders, depth))
                    .collect::<Result<_>>()?,
            )
        }
        serde_json::Value::Object(mut object) => {
            let depth = nested(depth)?;
            let tag = match object.get(SWHTYPE_KEY) {
                Some(serde_json::Value::String(tag))
                    if object.len() == 2 && object.contains_key(D_KEY) =>
                {
                    Some(tag.clone())
                }
                _ => None,
            };
            if tag.as_deref() == Some("bytes") {
                return match object.remove(D_KEY) {
                    Some(serde_json::Value::String(text)) => {
                        Ok(Value::Bytes(base85::decode(text.as_bytes())?))
                    }
                    _ => Err(CodecError::invalid_payload("bytes", "expected a string")),
                };
            }
            if let Some(decoder) = tag.as_deref().and_then(|tag| decoders.get(tag)) {
                let payload =
                    from_json(object.remove(D_KEY).unwrap_or_default(), decoders, depth)?;
                return decoder.decode(payload);
            }
            Value::Map(
                object
                    .into_iter()
                    .map(|(k, v)| Ok((k, from_json(v, decoders, depth)?)))
                    .collect::<Result<_>>()?,
            )
        }
    })
}

pub(crate) fn decode(data: &[u8], decoders: &DecoderTable) -> Result<Value> {
    from_json(serde_json::from_slice(data)?, decoders, 0)
}
