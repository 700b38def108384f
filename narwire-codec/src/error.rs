// SPDX-FileCopyrightText: 2025 Jörg Thalheim
// SPDX-License-Identifier: MIT

use narwire_utils_base_encoding::base85::Base85Error;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("{0} is a naive datetime.")]
    NaiveDateTime(String),

    #[error("object of type {0} is not serializable")]
    Unserializable(&'static str),

    #[error("float {0} cannot be represented in JSON")]
    NonFiniteFloat(f64),

    #[error("wrong content type `{0}` for API response")]
    UnknownContentType(String),

    #[error("unknown msgpack extended code {0}")]
    UnknownExtCode(i8),

    #[error("invalid payload for `{tag}`: {reason}")]
    InvalidPayload { tag: String, reason: String },

    #[error("unsupported msgpack map key: {0}")]
    InvalidMapKey(String),

    #[error("unknown exception class {module}.{type_name}")]
    UnknownException { module: String, type_name: String },

    #[error("cannot construct exception {module}.{type_name}: {reason}")]
    ExceptionConstruction {
        module: String,
        type_name: String,
        reason: String,
    },

    #[error("invalid ISO-8601 datetime {0:?}")]
    InvalidDateTime(String),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid msgpack: {0}")]
    MsgpackDecode(#[from] rmpv::decode::Error),

    #[error("writing msgpack: {0}")]
    MsgpackEncode(#[from] rmpv::encode::Error),

    #[error("{0} trailing bytes after msgpack value")]
    TrailingBytes(usize),

    #[error("invalid base85 data: {0}")]
    Base85(#[from] Base85Error),

    #[error("{0}")]
    Overflow(String),

    #[error("Limits were reached. Please, check your input.\n{0}")]
    LimitsReached(String),
}

impl CodecError {
    pub(crate) fn invalid_payload(tag: &str, reason: impl Into<String>) -> Self {
        CodecError::InvalidPayload {
            tag: tag.to_owned(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;
