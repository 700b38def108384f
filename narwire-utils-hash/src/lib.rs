// SPDX-FileCopyrightText: 2024 griff (original Nix.rs)
// SPDX-FileCopyrightText: 2026 Jörg Thalheim (Harmonia adaptation)
// SPDX-License-Identifier: EUPL-1.2 OR MIT

use std::fmt;

use narwire_utils_base_encoding::Base;
use sha2::Digest as _;

mod algo;
mod hashing_writer;

pub use algo::{Algorithm, UnknownAlgorithm};
pub use hashing_writer::HashingWriter;

const LARGEST_ALGORITHM: Algorithm = Algorithm::LARGEST;

#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct Hash {
    algorithm: Algorithm,
    data: [u8; LARGEST_ALGORITHM.size()],
}

impl Hash {
    pub const fn new(algorithm: Algorithm, hash: &[u8]) -> Hash {
        let mut data = [0u8; LARGEST_ALGORITHM.size()];
        let (hash_data, _postfix) = data.split_at_mut(algorithm.size());
        hash_data.copy_from_slice(hash);
        Hash { algorithm, data }
    }

    #[inline]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    #[inline]
    pub fn digest_bytes(&self) -> &[u8] {
        &self.data[0..(self.algorithm.size())]
    }

    /// Render the digest bytes (without the algorithm prefix) in `base`.
    pub fn to_base(&self, base: Base) -> String {
        base.encode(self.digest_bytes())
    }

    pub fn to_hex(&self) -> String {
        self.to_base(Base::Hex)
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({}:{})", self.algorithm, self.to_hex())
    }
}

/// `algo:hex`, the form printed when several digests are listed.
impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.to_hex())
    }
}

#[derive(Clone)]
enum InnerContext {
    MD5(md5::Context),
    SHA1(sha1::Sha1),
    SHA256(sha2::Sha256),
    SHA512(sha2::Sha512),
}

/// Incremental digest of one algorithm. Cloning forks the running state,
/// so a digest can be read mid-stream without disturbing it.
#[derive(Clone)]
pub struct Context(Algorithm, InnerContext);

impl Context {
    pub fn new(algorithm: Algorithm) -> Self {
        let inner = match algorithm {
            Algorithm::MD5 => InnerContext::MD5(md5::Context::new()),
            Algorithm::SHA1 => InnerContext::SHA1(sha1::Sha1::new()),
            Algorithm::SHA256 => InnerContext::SHA256(sha2::Sha256::new()),
            Algorithm::SHA512 => InnerContext::SHA512(sha2::Sha512::new()),
        };
        Context(algorithm, inner)
    }

    pub fn update<D: AsRef<[u8]>>(&mut self, data: D) {
        let data = data.as_ref();
        match &mut self.1 {
            InnerContext::MD5(ctx) => ctx.consume(data),
            InnerContext::SHA1(ctx) => ctx.update(data),
            InnerContext::SHA256(ctx) => ctx.update(data),
            InnerContext::SHA512(ctx) => ctx.update(data),
        }
    }

    pub fn finish(self) -> Hash {
        let algorithm = self.0;
        match self.1 {
            InnerContext::MD5(ctx) => Hash::new(algorithm, ctx.finalize().as_ref()),
            InnerContext::SHA1(ctx) => Hash::new(algorithm, &ctx.finalize()),
            InnerContext::SHA256(ctx) => Hash::new(algorithm, &ctx.finalize()),
            InnerContext::SHA512(ctx) => Hash::new(algorithm, &ctx.finalize()),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.0
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Context").field(&self.0).finish()
    }
}
