// SPDX-FileCopyrightText: 2024 griff (original Nix.rs)
// SPDX-FileCopyrightText: 2025 Jörg Thalheim (Harmonia adaptation)
// SPDX-License-Identifier: EUPL-1.2 OR MIT

use std::ffi::OsStr;
use std::io::{self, Read, Write};
use std::os::unix::ffi::OsStrExt as _;
use std::path::{Path, PathBuf};

use bstr::ByteSlice as _;
use bytes::Bytes;
use tracing::debug;

use super::{NAR_VERSION_MAGIC, NarEvent, NarNode};
use crate::error::{IoContext as _, NarError, NarOperation, Result};

const CHUNK_SIZE: usize = 64 * 1024;
const ZEROS: [u8; 8] = [0u8; 8];

/// Number of zero bytes that follow a `len`-byte token.
pub(crate) const fn padding_len(len: u64) -> usize {
    ((8 - len % 8) % 8) as usize
}

/// Writes the NAR token stream for a sequence of [`NarEvent`]s.
///
/// Every token is framed as a little-endian `u64` length, the bytes, and
/// zero padding up to the next multiple of eight. The archive magic is
/// written in front of the first event.
pub struct NarWriter<W> {
    inner: W,
    started: bool,
    /// One element per open directory: whether it was reached through an
    /// `entry` and needs the entry closed as well.
    dir_stack: Vec<bool>,
    path: PathBuf,
    debug: bool,
    indent: usize,
}

impl<W: Write> NarWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            started: false,
            dir_stack: Vec::new(),
            path: PathBuf::new(),
            debug: false,
            indent: 0,
        }
    }

    /// Path reported for the root node in logs and errors.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.path = root.into();
        self
    }

    /// Log every token at debug level, indented by nesting depth.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn write_str(&mut self, token: &[u8]) -> Result<()> {
        if self.debug {
            debug!("{:indent$}{}", "", token.as_bstr(), indent = self.indent * 2);
        }
        let len = token.len() as u64;
        self.write_raw(&len.to_le_bytes())?;
        self.write_raw(token)?;
        self.write_raw(&ZEROS[..padding_len(len)])
    }

    fn write_tokens(&mut self, tokens: &[&[u8]]) -> Result<()> {
        for token in tokens {
            self.write_str(token)?;
        }
        Ok(())
    }

    fn write_raw(&mut self, buf: &[u8]) -> Result<()> {
        self.inner.write_all(buf).map_err(NarError::Write)
    }

    /// Stream exactly `size` bytes from `reader` as one framed token.
    ///
    /// `path` only labels logs and errors. The reader yielding fewer or more
    /// than `size` bytes fails with [`NarError::FileChanged`].
    pub fn write_contents<R: Read>(&mut self, path: &Path, size: u64, mut reader: R) -> Result<()> {
        if self.debug {
            debug!(
                "{:indent$} <Content of file {}>",
                "",
                path.display(),
                indent = self.indent * 2
            );
        }
        self.write_raw(&size.to_le_bytes())?;

        let changed = || NarError::FileChanged {
            path: path.to_owned(),
            expected: size,
        };
        let mut buf = vec![0u8; CHUNK_SIZE.min(size as usize).max(1)];
        let mut remaining = size;
        while remaining > 0 {
            let want = buf.len().min(remaining as usize);
            let read = match reader.read(&mut buf[..want]) {
                Ok(0) => return Err(changed()),
                Ok(read) => read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err).io_context(NarOperation::ReadFile, path),
            };
            self.write_raw(&buf[..read])?;
            remaining -= read as u64;
        }
        let mut probe = [0u8; 1];
        if reader
            .read(&mut probe)
            .io_context(NarOperation::ReadFile, path)?
            != 0
        {
            return Err(changed());
        }

        self.write_raw(&ZEROS[..padding_len(size)])
    }

    /// Writes `entry ( name NAME node` for named nodes and the opening
    /// parenthesis of the node itself. Returns the path of the node.
    fn open_node(&mut self, name: &[u8]) -> Result<PathBuf> {
        if !self.started {
            self.write_str(NAR_VERSION_MAGIC)?;
            self.started = true;
        }
        let path = if name.is_empty() {
            self.path.clone()
        } else {
            self.indent += 1;
            self.write_tokens(&[b"entry", b"(", b"name", name, b"node"])?;
            self.path.join(OsStr::from_bytes(name))
        };
        self.indent += 1;
        self.write_str(b"(")?;
        Ok(path)
    }

    fn close_node(&mut self, named: bool) -> Result<()> {
        self.write_str(b")")?;
        self.indent -= 1;
        if named {
            self.write_str(b")")?;
            self.indent -= 1;
        }
        Ok(())
    }

    pub fn write_event<R: Read>(&mut self, event: NarEvent<R>) -> Result<()> {
        match event {
            NarEvent::File {
                name,
                executable,
                size,
                reader,
            } => {
                let path = self.open_node(&name)?;
                self.write_tokens(&[b"type", b"regular"])?;
                if executable {
                    self.write_tokens(&[b"executable", b""])?;
                }
                self.write_str(b"contents")?;
                self.write_contents(&path, size, reader)?;
                self.close_node(!name.is_empty())
            }
            NarEvent::Symlink { name, target } => {
                self.open_node(&name)?;
                self.write_tokens(&[b"type", b"symlink", b"target", &target[..]])?;
                self.close_node(!name.is_empty())
            }
            NarEvent::StartDirectory { name } => {
                self.path = self.open_node(&name)?;
                self.write_tokens(&[b"type", b"directory"])?;
                self.dir_stack.push(!name.is_empty());
                Ok(())
            }
            NarEvent::EndDirectory => {
                let named = self.dir_stack.pop().ok_or_else(|| {
                    NarError::Write(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "directory end without matching start",
                    ))
                })?;
                if named {
                    self.path.pop();
                }
                self.close_node(named)
            }
        }
    }

    /// Serialize an in-memory tree as the root of the archive.
    pub fn write_node(&mut self, node: &NarNode) -> Result<()> {
        self.write_named(Bytes::new(), node)
    }

    fn write_named(&mut self, name: Bytes, node: &NarNode) -> Result<()> {
        match node {
            NarNode::Regular {
                executable,
                contents,
            } => self.write_event(NarEvent::File {
                name,
                executable: *executable,
                size: contents.len() as u64,
                reader: &contents[..],
            }),
            NarNode::Symlink { target } => self.write_event(NarEvent::<&[u8]>::Symlink {
                name,
                target: target.clone(),
            }),
            NarNode::Directory(entries) => {
                self.write_event(NarEvent::<&[u8]>::StartDirectory { name })?;
                for (entry_name, child) in entries {
                    self.write_named(entry_name.clone(), child)?;
                }
                self.write_event(NarEvent::<&[u8]>::EndDirectory)
            }
        }
    }

    pub fn finish(mut self) -> Result<W> {
        if !self.dir_stack.is_empty() {
            return Err(NarError::Write(io::Error::new(
                io::ErrorKind::InvalidInput,
                "archive ended inside a directory",
            )));
        }
        self.inner.flush().map_err(NarError::Write)?;
        Ok(self.inner)
    }
}

#[cfg(test)]
mod unittests {
    use hex_literal::hex;
    use narwire_utils_hash::Algorithm;
    use rstest::rstest;

    use super::*;

    fn token(data: &[u8]) -> Vec<u8> {
        let mut out = (data.len() as u64).to_le_bytes().to_vec();
        out.extend_from_slice(data);
        out.resize(out.len() + padding_len(data.len() as u64), 0);
        out
    }

    fn serialize(node: &NarNode) -> Vec<u8> {
        let mut writer = NarWriter::new(Vec::new());
        writer.write_node(node).unwrap();
        writer.finish().unwrap()
    }

    #[rstest]
    #[case::empty(0, 0)]
    #[case::one(1, 7)]
    #[case::seven(7, 1)]
    #[case::eight(8, 0)]
    #[case::thirteen(13, 3)]
    fn test_padding_len(#[case] len: u64, #[case] padding: usize) {
        assert_eq!(padding_len(len), padding);
    }

    #[test]
    fn test_regular_file_layout() {
        let nar = serialize(&NarNode::regular(false, "data"));
        let expected: Vec<u8> = [
            token(b"nix-archive-1"),
            token(b"("),
            token(b"type"),
            token(b"regular"),
            token(b"contents"),
            token(b"data"),
            token(b")"),
        ]
        .concat();
        assert_eq!(nar, expected);
        assert_eq!(nar.len(), 120);
    }

    #[rstest]
    #[case::regular(
        NarNode::regular(false, "data"),
        hex!("55503380517132c9f1909c9417b073c991badec01cff327b1239258d8b421df3")
    )]
    #[case::empty_file(
        NarNode::regular(false, ""),
        hex!("77ac62e2629d8e45f624589c0c8bf99e24b3a722349bf1e79bc186008534e246")
    )]
    #[case::executable(
        NarNode::regular(true, "run"),
        hex!("1f9fe339ba88d2719b272779f0613007ca39fa83bd1579bd80810a5f3d4ad95b")
    )]
    #[case::symlink(
        NarNode::symlink("target/path"),
        hex!("8f9647d2482f5ba0ef2d9819728a26446a1b6ac85d54e2b0b808b7fbea96ac4c")
    )]
    #[case::example_tree(
        NarNode::directory([
            ("bar", NarNode::directory([("exe", NarNode::regular(true, "run"))])),
            ("baz", NarNode::regular(false, "data")),
        ]),
        hex!("c196b965e5024e8b6132f5e36bd9e12c7da4ac736db4635b75ee64b4014f2094")
    )]
    fn test_node_digest(#[case] node: NarNode, #[case] sha256: [u8; 32]) {
        let nar = serialize(&node);
        assert_eq!(Algorithm::SHA256.digest(&nar).digest_bytes(), sha256);
    }

    #[test]
    fn test_directory_entries_in_byte_order() {
        let nar = serialize(&NarNode::directory([
            ("b", NarNode::regular(false, "")),
            ("B", NarNode::regular(false, "")),
            ("a", NarNode::regular(false, "")),
        ]));
        let position = |name: &[u8]| {
            let needle = [token(b"name"), token(name)].concat();
            nar.windows(needle.len()).position(|w| w == needle).unwrap()
        };
        assert!(position(b"B") < position(b"a"));
        assert!(position(b"a") < position(b"b"));
    }

    #[test]
    fn test_debug_does_not_change_output() {
        let node = NarNode::directory([("f", NarNode::regular(true, "x"))]);
        let mut writer = NarWriter::new(Vec::new()).with_debug(true).with_root("root");
        writer.write_node(&node).unwrap();
        assert_eq!(writer.finish().unwrap(), serialize(&node));
    }

    #[rstest]
    #[case::short(b"ab".as_slice(), 3)]
    #[case::long(b"abcd".as_slice(), 3)]
    fn test_contents_size_mismatch(#[case] contents: &[u8], #[case] size: u64) {
        let mut writer = NarWriter::new(Vec::new()).with_root("out");
        let err = writer
            .write_event(NarEvent::File {
                name: Bytes::new(),
                executable: false,
                size,
                reader: contents,
            })
            .unwrap_err();
        match err {
            NarError::FileChanged { path, expected } => {
                assert_eq!(path, Path::new("out"));
                assert_eq!(expected, size);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_unbalanced_directory_end() {
        let mut writer = NarWriter::new(Vec::new());
        let err = writer
            .write_event(NarEvent::<&[u8]>::EndDirectory)
            .unwrap_err();
        assert!(matches!(err, NarError::Write(_)));
    }

    #[test]
    fn test_unterminated_directory() {
        let mut writer = NarWriter::new(Vec::new());
        writer
            .write_event(NarEvent::<&[u8]>::StartDirectory { name: Bytes::new() })
            .unwrap();
        assert!(writer.finish().is_err());
    }
}
