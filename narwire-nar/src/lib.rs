// SPDX-FileCopyrightText: 2024 griff
// SPDX-FileCopyrightText: 2025 Jörg Thalheim
// SPDX-License-Identifier: EUPL-1.2 OR MIT

//! NAR (Nix ARchive) serialization.
//!
//! A NAR is the canonical byte serialization of a filesystem tree made of
//! regular files, symlinks and directories. Timestamps, ownership and all
//! permission bits except "executable" are ignored, and directory entries
//! are always written in byte order of their names, so the same tree
//! serializes to the same bytes on every machine.
//!
//! [`Nar`] serializes a tree and hashes it in the same pass, [`NarParser`]
//! reads an archive back as a stream of [`NarEvent`]s, and [`nar_unpack`]
//! recreates a (possibly compressed) archive on disk.

pub type ByteString = bytes::Bytes;

pub mod archive;
mod error;

pub use archive::{
    Compression, NAR_VERSION_MAGIC, Nar, NarDigests, NarEvent, NarNode, NarParser, NarRestorer,
    NarWriter, compute_nar_hashes, nar_serialize, nar_unpack, open_nar, parse_nar_tree,
};
pub use error::{IoContext, NarError, NarOperation, Result};
