// SPDX-FileCopyrightText: 2026 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Base85 with the RFC 1924 alphabet.
//!
//! Input is split into big-endian 32-bit words, each written as five
//! digits, most significant first. A short final word is zero padded and
//! the digits standing for the padding are dropped from the output, so
//! `n` bytes always encode to `n + ceil(n / 4)` characters.

use thiserror::Error;

pub const ALPHABET: &[u8; 85] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz!#$%&()*+-;<=>?@^_`{|}~";

const INVALID: u8 = 0xff;

const DECODE_MAP: [u8; 256] = {
    let mut map = [INVALID; 256];
    let mut i = 0;
    while i < ALPHABET.len() {
        map[ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    map
};

#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
pub enum Base85Error {
    #[error("bad base85 character at position {0}")]
    InvalidCharacter(usize),
    #[error("base85 overflow in hunk starting at byte {0}")]
    Overflow(usize),
}

pub const fn encode_len(len: usize) -> usize {
    len + len.div_ceil(4)
}

pub fn encode(input: &[u8]) -> String {
    let mut output = String::with_capacity(encode_len(input.len()));
    for chunk in input.chunks(4) {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        let mut acc = u32::from_be_bytes(word);

        let mut digits = [0u8; 5];
        for digit in digits.iter_mut().rev() {
            *digit = ALPHABET[(acc % 85) as usize];
            acc /= 85;
        }
        for &digit in &digits[..chunk.len() + 1] {
            output.push(char::from(digit));
        }
    }
    output
}

pub fn decode(input: &[u8]) -> Result<Vec<u8>, Base85Error> {
    let mut output = Vec::with_capacity(input.len() / 5 * 4 + 4);
    for (index, chunk) in input.chunks(5).enumerate() {
        let start = index * 5;
        let mut acc: u64 = 0;
        for offset in 0..5 {
            // Short trailing hunks are padded with the highest digit
            let symbol = chunk.get(offset).copied().unwrap_or(b'~');
            let value = DECODE_MAP[symbol as usize];
            if value == INVALID {
                return Err(Base85Error::InvalidCharacter(start + offset));
            }
            acc = acc * 85 + u64::from(value);
        }
        let word = u32::try_from(acc).map_err(|_| Base85Error::Overflow(start))?;
        let keep = if chunk.len() == 5 { 4 } else { chunk.len() - 1 };
        output.extend_from_slice(&word.to_be_bytes()[..keep]);
    }
    Ok(output)
}
