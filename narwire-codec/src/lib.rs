// SPDX-FileCopyrightText: 2025 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Extensible JSON and msgpack codec.
//!
//! Values outside the native data model of a format are wrapped in an
//! envelope `{"swhtype": tag, "d": payload}`. An [`EncoderTable`] picks the
//! tag and payload for a value (first match wins, built-ins first) and a
//! [`DecoderTable`] turns tagged payloads back into values. Maps that do not
//! look exactly like an envelope with a known tag decode as plain maps, so
//! user data shaped like an envelope is indistinguishable from one.

use std::str::FromStr;
use std::sync::LazyLock;

use derive_more::Display;
use thiserror::Error;
use tracing::debug;

mod builtin;
mod error;
mod exception;
pub mod isoformat;
mod json;
mod msgpack;
mod table;
mod value;

pub use error::{CodecError, Result};
pub use exception::{BUILTINS, ConstructFn, ExceptionRegistry, RemoteException};
pub use msgpack::{EXT_LONG_INT, EXT_LONG_NEG_INT};
pub use table::{DecodeFn, Decoder, DecoderTable, EncodeFn, Encoder, EncoderTable, MatchFn};
pub use value::{Extension, Generator, PagedResult, TimeDelta, Value};

pub use num_bigint::BigInt;
pub use time;
pub use uuid::Uuid;

pub const SWHTYPE_KEY: &str = "swhtype";
pub const D_KEY: &str = "d";

/// Deepest nesting of lists, maps and envelopes, counted as they appear on
/// the wire. Both formats refuse to encode or decode anything deeper, and
/// the limit stays below the 128 levels `serde_json` parses.
pub const MAX_DEPTH: usize = 100;

/// Depth of the children of a container opened at `depth`.
pub(crate) fn nested(depth: usize) -> Result<usize> {
    if depth >= MAX_DEPTH {
        return Err(CodecError::Overflow(format!(
            "nesting deeper than {MAX_DEPTH} levels"
        )));
    }
    Ok(depth + 1)
}

#[derive(Display, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    #[display("json")]
    Json,
    #[display("msgpack")]
    Msgpack,
}

impl Format {
    pub const fn content_type(self) -> &'static str {
        match self {
            Format::Json => "application/json",
            Format::Msgpack => "application/x-msgpack",
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq, Clone)]
#[error("unknown format {0:?}, expected json or msgpack")]
pub struct UnknownFormat(String);

impl FromStr for Format {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "msgpack" => Ok(Format::Msgpack),
            _ => Err(UnknownFormat(s.to_owned())),
        }
    }
}

/// An encoder and a decoder table used together.
#[derive(Clone, Debug, Default)]
pub struct Codec {
    encoders: EncoderTable,
    decoders: DecoderTable,
}

static BUILTIN: LazyLock<Codec> = LazyLock::new(Codec::default);

impl Codec {
    /// Codec with the built-in tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in tables plus `extra_encoders` (tried after the built-ins) and
    /// `extra_decoders` (ignored for tags the built-ins already handle).
    pub fn with_extra(
        extra_encoders: impl IntoIterator<Item = Encoder>,
        extra_decoders: impl IntoIterator<Item = Decoder>,
    ) -> Self {
        Codec {
            encoders: EncoderTable::builtin().with_extra(extra_encoders),
            decoders: DecoderTable::builtin().with_extra(extra_decoders),
        }
    }

    pub fn from_tables(encoders: EncoderTable, decoders: DecoderTable) -> Self {
        Codec { encoders, decoders }
    }

    pub fn encoders(&self) -> &EncoderTable {
        &self.encoders
    }

    pub fn decoders(&self) -> &DecoderTable {
        &self.decoders
    }

    pub fn encode(&self, value: &Value, format: Format) -> Result<Vec<u8>> {
        match format {
            Format::Json => json::encode(value, &self.encoders).map(String::into_bytes),
            Format::Msgpack => msgpack::encode(value, &self.encoders),
        }
    }

    pub fn decode(&self, data: &[u8], format: Format) -> Result<Value> {
        match format {
            Format::Json => json::decode(data, &self.decoders),
            Format::Msgpack => msgpack::decode(data, &self.decoders),
        }
    }

    pub fn json_dumps(&self, value: &Value) -> Result<String> {
        json::encode(value, &self.encoders)
    }

    pub fn json_loads(&self, data: &str) -> Result<Value> {
        json::decode(data.as_bytes(), &self.decoders)
    }
}

fn with_encoders<T>(
    extra: impl IntoIterator<Item = Encoder>,
    f: impl FnOnce(&Codec) -> Result<T>,
) -> Result<T> {
    let extra: Vec<_> = extra.into_iter().collect();
    if extra.is_empty() {
        f(&BUILTIN)
    } else {
        f(&Codec::with_extra(extra, []))
    }
}

fn with_decoders<T>(
    extra: impl IntoIterator<Item = Decoder>,
    f: impl FnOnce(&Codec) -> Result<T>,
) -> Result<T> {
    let extra: Vec<_> = extra.into_iter().collect();
    if extra.is_empty() {
        f(&BUILTIN)
    } else {
        f(&Codec::with_extra([], extra))
    }
}

pub fn encode(
    value: &Value,
    format: Format,
    extra_encoders: impl IntoIterator<Item = Encoder>,
) -> Result<Vec<u8>> {
    with_encoders(extra_encoders, |codec| codec.encode(value, format))
}

pub fn decode(
    data: &[u8],
    format: Format,
    extra_decoders: impl IntoIterator<Item = Decoder>,
) -> Result<Value> {
    with_decoders(extra_decoders, |codec| codec.decode(data, format))
}

pub fn json_dumps(value: &Value, extra_encoders: impl IntoIterator<Item = Encoder>) -> Result<String> {
    with_encoders(extra_encoders, |codec| codec.json_dumps(value))
}

pub fn json_loads(data: &str, extra_decoders: impl IntoIterator<Item = Decoder>) -> Result<Value> {
    with_decoders(extra_decoders, |codec| codec.json_loads(data))
}

pub fn msgpack_dumps(
    value: &Value,
    extra_encoders: impl IntoIterator<Item = Encoder>,
) -> Result<Vec<u8>> {
    encode(value, Format::Msgpack, extra_encoders)
}

pub fn msgpack_loads(data: &[u8], extra_decoders: impl IntoIterator<Item = Decoder>) -> Result<Value> {
    decode(data, Format::Msgpack, extra_decoders)
}

/// Decode a response body according to its `Content-Type`: msgpack, JSON,
/// or (for `text/*`) the body as a string.
pub fn decode_content(
    content_type: &str,
    body: &[u8],
    extra_decoders: impl IntoIterator<Item = Decoder>,
) -> Result<Value> {
    debug!(content_type, len = body.len(), "decoding response");
    if content_type.starts_with(Format::Msgpack.content_type()) {
        msgpack_loads(body, extra_decoders)
    } else if content_type.starts_with(Format::Json.content_type()) {
        decode(body, Format::Json, extra_decoders)
    } else if content_type.starts_with("text/") {
        Ok(Value::String(String::from_utf8_lossy(body).into_owned()))
    } else {
        Err(CodecError::UnknownContentType(content_type.to_owned()))
    }
}

/// Encode a request body as msgpack. Values exceeding the encoder's limits
/// are reported as [`CodecError::LimitsReached`].
pub fn encode_data_client(
    value: &Value,
    extra_encoders: impl IntoIterator<Item = Encoder>,
) -> Result<Vec<u8>> {
    msgpack_dumps(value, extra_encoders).map_err(|e| match e {
        CodecError::Overflow(reason) => CodecError::LimitsReached(reason),
        other => other,
    })
}
