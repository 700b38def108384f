// SPDX-FileCopyrightText: 2025 Jörg Thalheim
// SPDX-License-Identifier: MIT

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::builtin;
use crate::error::{CodecError, Result};
use crate::exception::ExceptionRegistry;
use crate::value::Value;

pub type MatchFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
pub type EncodeFn = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>;
pub type DecodeFn = Arc<dyn Fn(Value) -> Result<Value> + Send + Sync>;

/// Turns values it matches into the payload of a `tag` envelope. The
/// payload is encoded recursively with the same tables.
#[derive(Clone)]
pub struct Encoder {
    tag: String,
    matches: MatchFn,
    encode: EncodeFn,
}

impl Encoder {
    pub fn new<M, E>(tag: impl Into<String>, matches: M, encode: E) -> Self
    where
        M: Fn(&Value) -> bool + Send + Sync + 'static,
        E: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        Encoder {
            tag: tag.into(),
            matches: Arc::new(matches),
            encode: Arc::new(encode),
        }
    }

    /// Encoder for [`Value::Extension`]s wrapping a `T`.
    pub fn extension<T, E>(tag: impl Into<String>, encode: E) -> Self
    where
        T: Any,
        E: Fn(&T) -> Result<Value> + Send + Sync + 'static,
    {
        Self::new(
            tag,
            |value| matches!(value, Value::Extension(ext) if ext.is::<T>()),
            move |value| match value {
                Value::Extension(ext) => match ext.downcast_ref::<T>() {
                    Some(inner) => encode(inner),
                    None => Err(CodecError::Unserializable(ext.type_name())),
                },
                other => Err(CodecError::Unserializable(other.type_name())),
            },
        )
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn matches(&self, value: &Value) -> bool {
        (self.matches)(value)
    }

    pub fn encode(&self, value: &Value) -> Result<Value> {
        (self.encode)(value)
    }
}

impl fmt::Debug for Encoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Encoder").field(&self.tag).finish()
    }
}

/// Rebuilds a value from the payload of a `tag` envelope.
#[derive(Clone)]
pub struct Decoder {
    tag: String,
    decode: DecodeFn,
}

impl Decoder {
    pub fn new<D>(tag: impl Into<String>, decode: D) -> Self
    where
        D: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        Decoder {
            tag: tag.into(),
            decode: Arc::new(decode),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn decode(&self, payload: Value) -> Result<Value> {
        (self.decode)(payload)
    }
}

impl fmt::Debug for Decoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Decoder").field(&self.tag).finish()
    }
}

/// Ordered encoders; the first one matching a value wins.
#[derive(Clone, Debug)]
pub struct EncoderTable {
    encoders: Vec<Encoder>,
}

impl EncoderTable {
    pub fn empty() -> Self {
        EncoderTable {
            encoders: Vec::new(),
        }
    }

    /// `arrow`, `datetime`, `timedelta`, `uuid`, `paged_result`, `bytes`
    /// and `exception`, in that order.
    pub fn builtin() -> Self {
        EncoderTable {
            encoders: builtin::encoders(),
        }
    }

    /// Returns a copy with `extra` appended after the existing encoders.
    pub fn with_extra(mut self, extra: impl IntoIterator<Item = Encoder>) -> Self {
        self.encoders.extend(extra);
        self
    }

    pub fn push(&mut self, encoder: Encoder) {
        self.encoders.push(encoder);
    }

    pub fn find(&self, value: &Value) -> Option<&Encoder> {
        self.encoders.iter().find(|encoder| encoder.matches(value))
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.encoders.iter().map(Encoder::tag)
    }

    pub fn len(&self) -> usize {
        self.encoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encoders.is_empty()
    }
}

impl Default for EncoderTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Decoders looked up by exact tag.
#[derive(Clone, Debug)]
pub struct DecoderTable {
    decoders: BTreeMap<String, Decoder>,
}

impl DecoderTable {
    pub fn empty() -> Self {
        DecoderTable {
            decoders: BTreeMap::new(),
        }
    }

    pub fn builtin() -> Self {
        Self::builtin_with_exceptions(ExceptionRegistry::default())
    }

    /// Built-in decoders, rebuilding exceptions through `registry`.
    pub fn builtin_with_exceptions(registry: ExceptionRegistry) -> Self {
        let mut table = Self::empty();
        for decoder in builtin::decoders(registry) {
            table.insert(decoder);
        }
        table
    }

    /// Add `decoder`, replacing any decoder registered under its tag.
    pub fn insert(&mut self, decoder: Decoder) -> Option<Decoder> {
        self.decoders.insert(decoder.tag.clone(), decoder)
    }

    /// Returns a copy extended with `extra`. Tags already present keep
    /// their decoder.
    pub fn with_extra(mut self, extra: impl IntoIterator<Item = Decoder>) -> Self {
        for decoder in extra {
            if self.decoders.contains_key(decoder.tag()) {
                warn!(tag = decoder.tag(), "ignoring extra decoder shadowing an existing tag");
                continue;
            }
            self.insert(decoder);
        }
        self
    }

    pub fn get(&self, tag: &str) -> Option<&Decoder> {
        self.decoders.get(tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.decoders.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }
}

impl Default for DecoderTable {
    fn default() -> Self {
        Self::builtin()
    }
}
