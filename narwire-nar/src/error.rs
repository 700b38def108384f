// SPDX-FileCopyrightText: 2025 Jörg Thalheim
// SPDX-License-Identifier: MIT

use std::io;
use std::path::{Path, PathBuf};

use bstr::BString;
use derive_more::Display;
use thiserror::Error;

#[derive(Display, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub enum NarOperation {
    #[display("reading metadata of")]
    ReadMetadata,
    #[display("listing directory")]
    ListDirectory,
    #[display("reading symlink")]
    ReadLink,
    #[display("opening file")]
    OpenFile,
    #[display("reading file")]
    ReadFile,
    #[display("opening archive")]
    OpenArchive,
    #[display("creating directory")]
    CreateDirectory,
    #[display("creating symlink")]
    CreateSymlink,
    #[display("creating file")]
    CreateFile,
}

#[derive(Error, Debug)]
pub enum NarError {
    #[error("{operation} {}: {source}", path.display())]
    Io {
        operation: NarOperation,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("writing archive: {0}")]
    Write(#[source] io::Error),

    #[error("reading archive: {0}")]
    Read(#[source] io::Error),

    #[error("unsupported file type at {}", .0.display())]
    UnsupportedFileType(PathBuf),

    #[error("file {} changed size while serializing (expected {expected} bytes)", path.display())]
    FileChanged { path: PathBuf, expected: u64 },

    #[error("not a NAR archive: bad magic {0:?}")]
    BadMagic(BString),

    #[error("unexpected token {actual:?}, expected {expected:?}")]
    UnexpectedToken { expected: BString, actual: BString },

    #[error("unknown node type {0:?}")]
    UnknownNodeType(BString),

    #[error("invalid entry name {0:?}")]
    InvalidName(BString),

    #[error("entry {name:?} is not sorted after {previous:?}")]
    UnsortedEntry { previous: BString, name: BString },

    #[error("non-zero padding after {0}-byte token")]
    NonZeroPadding(u64),

    #[error("token of {0} bytes exceeds the limit")]
    TokenTooLong(u64),

    #[error("archive nests directories deeper than {0} levels")]
    TooDeep(usize),
}

pub type Result<T> = std::result::Result<T, NarError>;

/// Extension trait for attaching the failed operation and path to IO errors
pub trait IoContext<T> {
    fn io_context(self, operation: NarOperation, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for std::result::Result<T, io::Error> {
    fn io_context(self, operation: NarOperation, path: &Path) -> Result<T> {
        self.map_err(|source| NarError::Io {
            operation,
            path: path.to_owned(),
            source,
        })
    }
}

impl From<walkdir::Error> for NarError {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(Path::to_owned).unwrap_or_default();
        let source = err
            .into_io_error()
            .unwrap_or_else(|| io::Error::other("filesystem loop"));
        NarError::Io {
            operation: NarOperation::ListDirectory,
            path,
            source,
        }
    }
}
