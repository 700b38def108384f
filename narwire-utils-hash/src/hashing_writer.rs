// SPDX-FileCopyrightText: 2026 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! A writer adapter that computes digests on the fly.
//!
//! Every byte written through this wrapper is fed into one [`Context`] per
//! requested algorithm before it reaches the inner writer, so a stream can
//! be hashed with several algorithms without ever being buffered.

use std::io::{self, Write};

use crate::{Algorithm, Context, Hash};

/// Wraps a [`Write`] and incrementally hashes every byte that passes
/// through.
///
/// ```
/// use std::io::Write;
/// use narwire_utils_hash::{Algorithm, HashingWriter};
///
/// let mut writer = HashingWriter::new(Vec::new(), &[Algorithm::SHA256]);
/// writer.write_all(b"hello, world").unwrap();
///
/// assert_eq!(writer.digests(), vec![Algorithm::SHA256.digest("hello, world")]);
/// assert_eq!(writer.bytes_written(), 12);
/// ```
pub struct HashingWriter<W> {
    inner: W,
    contexts: Vec<Context>,
    bytes_written: u64,
}

impl<W> HashingWriter<W> {
    /// Duplicate algorithms are hashed once.
    pub fn new(inner: W, algorithms: &[Algorithm]) -> Self {
        let mut contexts: Vec<Context> = Vec::with_capacity(algorithms.len());
        for &algorithm in algorithms {
            if !contexts.iter().any(|ctx| ctx.algorithm() == algorithm) {
                contexts.push(Context::new(algorithm));
            }
        }
        Self {
            inner,
            contexts,
            bytes_written: 0,
        }
    }

    pub fn algorithms(&self) -> impl Iterator<Item = Algorithm> + '_ {
        self.contexts.iter().map(Context::algorithm)
    }

    /// Total number of bytes that have been written through the writer.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Current digest of every context, in the order the algorithms were
    /// requested. The running contexts are left untouched.
    pub fn digests(&self) -> Vec<Hash> {
        self.contexts
            .iter()
            .map(|ctx| ctx.clone().finish())
            .collect()
    }

    /// Start every context over, as if nothing had been written.
    pub fn reset(&mut self) {
        for ctx in self.contexts.iter_mut() {
            *ctx = Context::new(ctx.algorithm());
        }
        self.bytes_written = 0;
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Consume the writer and return the inner writer along with the
    /// final digests.
    pub fn finish(self) -> (W, Vec<Hash>) {
        let digests = self.contexts.into_iter().map(Context::finish).collect();
        (self.inner, digests)
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        let accepted = &buf[..written];
        for ctx in self.contexts.iter_mut() {
            ctx.update(accepted);
        }
        self.bytes_written += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashing_writer_multiple_algorithms() {
        let data = b"hello, world";
        let mut writer = HashingWriter::new(Vec::new(), &[Algorithm::SHA1, Algorithm::SHA256]);
        writer.write_all(&data[..5]).unwrap();
        writer.write_all(&data[5..]).unwrap();

        assert_eq!(writer.bytes_written(), data.len() as u64);
        let (inner, digests) = writer.finish();
        assert_eq!(inner, data);
        assert_eq!(
            digests,
            vec![
                Algorithm::SHA1.digest(data),
                Algorithm::SHA256.digest(data)
            ]
        );
    }

    #[test]
    fn test_hashing_writer_digests_are_repeatable() {
        let mut writer = HashingWriter::new(io::sink(), &[Algorithm::SHA256]);
        writer.write_all(b"abc").unwrap();
        assert_eq!(writer.digests(), writer.digests());
        writer.write_all(b"def").unwrap();
        assert_eq!(writer.digests(), vec![Algorithm::SHA256.digest("abcdef")]);
    }

    #[test]
    fn test_hashing_writer_reset() {
        let mut writer = HashingWriter::new(io::sink(), &[Algorithm::MD5]);
        writer.write_all(b"discarded").unwrap();
        writer.reset();
        assert_eq!(writer.bytes_written(), 0);
        assert_eq!(writer.digests(), vec![Algorithm::MD5.digest("")]);
    }

    #[test]
    fn test_hashing_writer_dedups_algorithms() {
        let writer = HashingWriter::new(
            io::sink(),
            &[Algorithm::SHA256, Algorithm::SHA1, Algorithm::SHA256],
        );
        assert_eq!(
            writer.algorithms().collect::<Vec<_>>(),
            vec![Algorithm::SHA256, Algorithm::SHA1]
        );
    }
}
