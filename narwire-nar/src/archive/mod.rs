// SPDX-FileCopyrightText: 2024 griff (original Nix.rs)
// SPDX-FileCopyrightText: 2025 Jörg Thalheim (Harmonia adaptation)
// SPDX-License-Identifier: EUPL-1.2 OR MIT

use std::collections::BTreeMap;

use crate::ByteString;

mod compression;
mod dumper;
mod parser;
mod restorer;
mod writer;

pub use compression::{Compression, open_nar};
pub use dumper::{Nar, NarDigests, compute_nar_hashes, nar_serialize};
pub use parser::{MAX_NAR_DEPTH, NarParser, parse_nar_tree};
pub use restorer::{NarRestorer, nar_unpack};
pub use writer::NarWriter;

pub const NAR_VERSION_MAGIC: &[u8] = b"nix-archive-1";

/// A flattened, depth-first view of an archive.
///
/// The root node carries an empty name, every other node the name of its
/// directory entry. Each `StartDirectory` is closed by an `EndDirectory`.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash)]
pub enum NarEvent<R> {
    File {
        name: ByteString,
        executable: bool,
        size: u64,
        reader: R,
    },
    Symlink {
        name: ByteString,
        target: ByteString,
    },
    StartDirectory {
        name: ByteString,
    },
    EndDirectory,
}

/// An in-memory filesystem tree, serialized exactly like the tree it
/// mirrors on disk.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum NarNode {
    Regular {
        executable: bool,
        contents: ByteString,
    },
    Symlink {
        target: ByteString,
    },
    /// Entries are kept in byte order of their names, which is the order
    /// they are archived in.
    Directory(BTreeMap<ByteString, NarNode>),
}

impl NarNode {
    pub fn regular(executable: bool, contents: impl Into<ByteString>) -> Self {
        NarNode::Regular {
            executable,
            contents: contents.into(),
        }
    }

    pub fn symlink(target: impl Into<ByteString>) -> Self {
        NarNode::Symlink {
            target: target.into(),
        }
    }

    pub fn directory<N, I>(entries: I) -> Self
    where
        N: Into<ByteString>,
        I: IntoIterator<Item = (N, NarNode)>,
    {
        NarNode::Directory(
            entries
                .into_iter()
                .map(|(name, node)| (name.into(), node))
                .collect(),
        )
    }
}
