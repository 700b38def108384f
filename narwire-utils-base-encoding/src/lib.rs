// SPDX-FileCopyrightText: 2026 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Text encodings for digests and binary payloads.
//!
//! [`Base`] selects how a digest is rendered (`hex`, Nix `base32`,
//! `base64`); [`base85`] is the RFC 1924 alphabet used for bytes in the
//! JSON codec.

use std::str::FromStr;

use data_encoding::{BASE64, DecodeError, HEXLOWER_PERMISSIVE};
use thiserror::Error;

pub mod base32;
pub mod base85;

/// Padded base64 length for `decoded_size` input bytes.
pub const fn base64_len(decoded_size: usize) -> usize {
    decoded_size.div_ceil(3) * 4
}

#[derive(derive_more::Display, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Default)]
pub enum Base {
    #[default]
    #[display("hex")]
    Hex,
    #[display("base32")]
    NixBase32,
    #[display("base64")]
    Base64,
}

impl Base {
    /// Calculate the encoded string length for a given decoded byte size
    #[inline]
    pub const fn input_len(&self, decoded_size: usize) -> usize {
        match self {
            Base::Hex => decoded_size * 2,
            Base::NixBase32 => base32::encode_len(decoded_size),
            Base::Base64 => base64_len(decoded_size),
        }
    }

    pub fn encode(&self, input: &[u8]) -> String {
        match self {
            Base::Hex => HEXLOWER_PERMISSIVE.encode(input),
            Base::NixBase32 => base32::encode_string(input),
            Base::Base64 => BASE64.encode(input),
        }
    }

    pub fn decode(&self, input: &[u8]) -> Result<Vec<u8>, DecodeError> {
        match self {
            Base::Hex => HEXLOWER_PERMISSIVE.decode(input),
            Base::NixBase32 => base32::decode(input),
            Base::Base64 => BASE64.decode(input),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq, Clone)]
#[error("unknown encoding '{0}', expected one of hex, base32, base64")]
pub struct UnknownBase(pub String);

impl FromStr for Base {
    type Err = UnknownBase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("hex") || s.eq_ignore_ascii_case("base16") {
            Ok(Base::Hex)
        } else if s.eq_ignore_ascii_case("base32") || s.eq_ignore_ascii_case("nix32") {
            Ok(Base::NixBase32)
        } else if s.eq_ignore_ascii_case("base64") {
            Ok(Base::Base64)
        } else {
            Err(UnknownBase(s.to_owned()))
        }
    }
}
