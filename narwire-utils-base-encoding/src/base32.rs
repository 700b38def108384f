// SPDX-FileCopyrightText: 2024 griff (original Nix.rs)
// SPDX-FileCopyrightText: 2026 Jörg Thalheim (Harmonia adaptation)
// SPDX-License-Identifier: EUPL-1.2 OR MIT

//! Nix base32 encoding/decoding.
//!
//! This is the base32 flavour `nix-hash --base32` prints: the alphabet
//! omits `e`, `o`, `t` and `u`, there is no padding, bits are taken least
//! significant first and the resulting string is reversed.

use data_encoding::{BitOrder, DecodeError, DecodeKind, DecodePartial, Encoding, Specification};
use std::sync::LazyLock;

/// The 32-character alphabet used by Nix's base32 encoding.
pub const ALPHABET: &str = "0123456789abcdfghijklmnpqrsvwxyz";

static NIX_BASE32: LazyLock<Encoding> = LazyLock::new(|| {
    let mut spec = Specification::new();
    spec.symbols.push_str(ALPHABET);
    spec.bit_order = BitOrder::LeastSignificantFirst;
    spec.encoding().unwrap()
});

pub const fn encode_len(len: usize) -> usize {
    (8 * len).div_ceil(5)
}

const fn decode_len_internal(len: usize) -> (usize, usize) {
    let trail = len * 5 % 8;
    (len - trail / 5, 5 * len / 8)
}

/// Number of bytes `len` base32 characters decode to, or `None` when no
/// byte string encodes to exactly `len` characters.
pub const fn decode_len(len: usize) -> Option<usize> {
    let (ilen, olen) = decode_len_internal(len);
    if ilen != len { None } else { Some(olen) }
}

pub fn encode_string(input: &[u8]) -> String {
    // Nix base32 is reversed
    NIX_BASE32.encode(input).chars().rev().collect()
}

pub fn encode_mut(input: &[u8], output: &mut [u8]) {
    NIX_BASE32.encode_mut(input, output);
    output.reverse();
}

pub fn decode_mut(input: &[u8], output: &mut [u8]) -> Result<usize, DecodePartial> {
    let mut reversed = input.to_vec();
    reversed.reverse();

    NIX_BASE32.decode_mut(&reversed, output).map_err(|err| {
        // Report the position in the caller's (unreversed) input
        let adjusted_pos = input.len() - err.error.position - 1;
        DecodePartial {
            read: adjusted_pos / 8 * 8,
            written: adjusted_pos / 8 * 5,
            error: DecodeError {
                position: adjusted_pos,
                kind: err.error.kind,
            },
        }
    })
}

pub fn decode(input: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let Some(len) = decode_len(input.len()) else {
        return Err(DecodeError {
            position: input.len(),
            kind: DecodeKind::Length,
        });
    };
    let mut output = vec![0u8; len];
    decode_mut(input, &mut output).map_err(|partial| partial.error)?;
    Ok(output)
}
