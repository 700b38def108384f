// SPDX-FileCopyrightText: 2025 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Encoders and decoders every codec starts with.

use std::collections::BTreeMap;

use narwire_utils_base_encoding::base85;
use uuid::Uuid;

use crate::error::{CodecError, Result};
use crate::exception::{ExceptionRegistry, RemoteException};
use crate::isoformat::{self, Parsed};
use crate::table::{Decoder, Encoder};
use crate::value::{PagedResult, TimeDelta, Value};

pub(crate) fn encoders() -> Vec<Encoder> {
    vec![
        Encoder::new(
            "arrow",
            |v| matches!(v, Value::Timestamp(_)),
            |v| match v {
                Value::Timestamp(dt) => Ok(Value::String(isoformat::format_offset(dt))),
                other => Err(CodecError::Unserializable(other.type_name())),
            },
        ),
        Encoder::new(
            "datetime",
            |v| matches!(v, Value::DateTime(_) | Value::NaiveDateTime(_)),
            |v| match v {
                Value::DateTime(dt) => Ok(Value::String(isoformat::format_offset(dt))),
                Value::NaiveDateTime(dt) => Err(CodecError::NaiveDateTime(
                    isoformat::format_naive(dt, ' '),
                )),
                other => Err(CodecError::Unserializable(other.type_name())),
            },
        ),
        Encoder::new(
            "timedelta",
            |v| matches!(v, Value::TimeDelta(_)),
            |v| match v {
                Value::TimeDelta(delta) => Ok(Value::map([
                    ("days", Value::from(delta.days())),
                    ("seconds", Value::from(delta.seconds())),
                    ("microseconds", Value::from(delta.microseconds())),
                ])),
                other => Err(CodecError::Unserializable(other.type_name())),
            },
        ),
        Encoder::new(
            "uuid",
            |v| matches!(v, Value::Uuid(_)),
            |v| match v {
                Value::Uuid(uuid) => Ok(Value::String(uuid.hyphenated().to_string())),
                other => Err(CodecError::Unserializable(other.type_name())),
            },
        ),
        Encoder::new(
            "paged_result",
            |v| matches!(v, Value::PagedResult(_)),
            |v| match v {
                Value::PagedResult(page) => Ok(Value::map([
                    ("results", Value::List(page.results.clone())),
                    (
                        "next_page_token",
                        page.next_page_token.clone().unwrap_or(Value::Null),
                    ),
                ])),
                other => Err(CodecError::Unserializable(other.type_name())),
            },
        ),
        // Only reached by JSON, msgpack carries bytes natively
        Encoder::new(
            "bytes",
            |v| matches!(v, Value::Bytes(_)),
            |v| match v {
                Value::Bytes(data) => Ok(Value::String(base85::encode(data))),
                other => Err(CodecError::Unserializable(other.type_name())),
            },
        ),
        Encoder::new(
            "exception",
            |v| matches!(v, Value::Exception(_)),
            |v| match v {
                Value::Exception(exc) => Ok(Value::map([
                    ("type", Value::from(exc.type_name.as_str())),
                    ("module", Value::from(exc.module.as_str())),
                    ("args", Value::List(exc.args.clone())),
                    ("message", Value::from(exc.message.as_str())),
                    (
                        "traceback",
                        Value::List(exc.traceback.iter().map(|l| Value::from(l.as_str())).collect()),
                    ),
                ])),
                other => Err(CodecError::Unserializable(other.type_name())),
            },
        ),
    ]
}

pub(crate) fn decoders(registry: ExceptionRegistry) -> Vec<Decoder> {
    vec![
        Decoder::new("arrow", decode_arrow),
        Decoder::new("datetime", decode_datetime),
        Decoder::new("timedelta", decode_timedelta),
        Decoder::new("uuid", decode_uuid),
        Decoder::new("paged_result", decode_paged_result),
        Decoder::new("bytes", decode_bytes),
        Decoder::new("exception", move |payload| decode_exception(&registry, payload)),
    ]
}

fn expect_str<'a>(tag: &str, payload: &'a Value) -> Result<&'a str> {
    payload.as_str().ok_or_else(|| {
        CodecError::invalid_payload(
            tag,
            format!("expected a string, got {}", payload.type_name()),
        )
    })
}

fn expect_map(tag: &str, payload: Value) -> Result<BTreeMap<String, Value>> {
    match payload {
        Value::Map(map) => Ok(map),
        other => Err(CodecError::invalid_payload(
            tag,
            format!("expected a map, got {}", other.type_name()),
        )),
    }
}

/// Naive input is taken as UTC.
pub(crate) fn decode_arrow(payload: Value) -> Result<Value> {
    Ok(match isoformat::parse(expect_str("arrow", &payload)?)? {
        Parsed::Aware(dt) => Value::Timestamp(dt),
        Parsed::Naive(dt) => Value::Timestamp(dt.assume_utc()),
    })
}

pub(crate) fn decode_datetime(payload: Value) -> Result<Value> {
    Ok(match isoformat::parse(expect_str("datetime", &payload)?)? {
        Parsed::Aware(dt) => Value::DateTime(dt),
        Parsed::Naive(dt) => Value::NaiveDateTime(dt),
    })
}

const TIMEDELTA_UNITS: &[(&str, i128)] = &[
    ("weeks", 7 * 86_400_000_000),
    ("days", 86_400_000_000),
    ("hours", 3_600_000_000),
    ("minutes", 60_000_000),
    ("seconds", 1_000_000),
    ("milliseconds", 1_000),
    ("microseconds", 1),
];

/// Accepts any of the keyword arguments of a timedelta constructor, as
/// integers.
pub(crate) fn decode_timedelta(payload: Value) -> Result<Value> {
    let mut total: i128 = 0;
    for (key, value) in expect_map("timedelta", payload)? {
        let scale = TIMEDELTA_UNITS
            .iter()
            .find(|(unit, _)| *unit == key)
            .map(|(_, scale)| *scale)
            .ok_or_else(|| CodecError::invalid_payload("timedelta", format!("unknown field {key:?}")))?;
        let amount = match &value {
            Value::Int(i) => i128::try_from(i).ok(),
            _ => None,
        }
        .ok_or_else(|| CodecError::invalid_payload("timedelta", format!("bad value for {key}: {value}")))?;
        total = amount
            .checked_mul(scale)
            .and_then(|micros| total.checked_add(micros))
            .ok_or_else(|| CodecError::invalid_payload("timedelta", "out of range"))?;
    }
    TimeDelta::from_micros(total)
        .map(Value::TimeDelta)
        .ok_or_else(|| CodecError::invalid_payload("timedelta", "out of range"))
}

pub(crate) fn decode_uuid(payload: Value) -> Result<Value> {
    let text = expect_str("uuid", &payload)?;
    Uuid::parse_str(text)
        .map(Value::Uuid)
        .map_err(|e| CodecError::invalid_payload("uuid", e.to_string()))
}

fn decode_paged_result(payload: Value) -> Result<Value> {
    let mut map = expect_map("paged_result", payload)?;
    let results = match map.remove("results") {
        Some(Value::List(results)) => results,
        Some(other) => {
            return Err(CodecError::invalid_payload(
                "paged_result",
                format!("results must be a list, got {}", other.type_name()),
            ));
        }
        None => return Err(CodecError::invalid_payload("paged_result", "missing results")),
    };
    let next_page_token = match map.remove("next_page_token") {
        Some(Value::Null) => None,
        Some(token) => Some(token),
        None => {
            return Err(CodecError::invalid_payload(
                "paged_result",
                "missing next_page_token",
            ));
        }
    };
    Ok(PagedResult::new(results, next_page_token).into())
}

pub(crate) fn decode_bytes(payload: Value) -> Result<Value> {
    let text = expect_str("bytes", &payload)?;
    Ok(Value::Bytes(base85::decode(text.as_bytes())?))
}

fn decode_exception(registry: &ExceptionRegistry, payload: Value) -> Result<Value> {
    let mut map = expect_map("exception", payload)?;
    let mut field = |name: &str| -> Result<String> {
        match map.remove(name) {
            Some(Value::String(s)) => Ok(s),
            _ => Err(CodecError::invalid_payload(
                "exception",
                format!("missing or non-string {name}"),
            )),
        }
    };
    let module = field("module")?;
    let type_name = field("type")?;
    let args = match map.remove("args") {
        Some(Value::List(args)) => args,
        None => Vec::new(),
        Some(other) => {
            return Err(CodecError::invalid_payload(
                "exception",
                format!("args must be a list, got {}", other.type_name()),
            ));
        }
    };
    let exc: RemoteException = registry.construct(&module, &type_name, args)?;
    Ok(exc.into())
}
