// SPDX-FileCopyrightText: 2024 griff (original Nix.rs)
// SPDX-FileCopyrightText: 2025 Jörg Thalheim (Harmonia adaptation)
// SPDX-License-Identifier: EUPL-1.2 OR MIT

//! Test utilities for narwire.
//!
//! Filesystem fixtures for the NAR serializer and proptest strategies
//! shared between crates.

use std::fs;
use std::io;
use std::os::unix::fs::{PermissionsExt as _, symlink};
use std::path::{Path, PathBuf};

use proptest::prelude::*;
use tempfile::TempDir;

/// Byte string type alias.
pub type ByteString = bytes::Bytes;

/// A wrapper around TempDir that provides a canonicalized path.
/// This resolves symlinks like /var -> /private/var on macOS.
pub struct CanonicalTempDir {
    _inner: TempDir,
    path: PathBuf,
}

impl CanonicalTempDir {
    /// Create a new temporary directory with a canonicalized path.
    pub fn new() -> io::Result<Self> {
        let inner = TempDir::new()?;
        let path = inner.path().canonicalize()?;
        Ok(Self {
            _inner: inner,
            path,
        })
    }

    /// Get the canonicalized path to the temporary directory.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Builds a file tree below a root directory with explicit permissions, so
/// that fixtures do not depend on the umask of the test runner.
pub struct TreeBuilder {
    root: PathBuf,
}

impl TreeBuilder {
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn file(&self, rel: &str, contents: &[u8], mode: u32) -> io::Result<&Self> {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(mode))?;
        Ok(self)
    }

    pub fn dir(&self, rel: &str) -> io::Result<&Self> {
        let path = self.root.join(rel);
        fs::create_dir_all(&path)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
        Ok(self)
    }

    pub fn symlink(&self, rel: &str, target: &str) -> io::Result<&Self> {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        symlink(target, path)?;
        Ok(self)
    }
}

/// `foo/bar/exe` (executable, `run`) and `foo/baz` (`data`).
pub fn example_tree(parent: &Path) -> io::Result<PathBuf> {
    let tree = TreeBuilder::new(parent.join("foo"))?;
    tree.file("bar/exe", b"run", 0o755)?
        .file("baz", b"data", 0o644)?;
    Ok(tree.root().to_owned())
}

/// A tree with `.git` directories at two levels and a `.svn` directory
/// next to the nested one.
pub fn vcs_tree(parent: &Path) -> io::Result<PathBuf> {
    let tree = TreeBuilder::new(parent.join("repo"))?;
    tree.file("file", b"file", 0o644)?
        .file(".git/foo", b"foo", 0o644)?
        .file("bar/.git/baz", b"baz", 0o644)?
        .dir("bar/.svn")?;
    Ok(tree.root().to_owned())
}

pub fn arb_filename() -> impl Strategy<Value = String> {
    "[a-zA-Z 0-9.?=+]+".prop_filter("Not cur and parent dir", |s| s != "." && s != "..")
}

prop_compose! {
    pub fn arb_byte_string()(data in any::<Vec<u8>>()) -> ByteString {
        ByteString::from(data)
    }
}
