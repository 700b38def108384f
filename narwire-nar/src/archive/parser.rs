// SPDX-FileCopyrightText: 2024 griff (original Nix.rs)
// SPDX-FileCopyrightText: 2025 Jörg Thalheim (Harmonia adaptation)
// SPDX-License-Identifier: EUPL-1.2 OR MIT

use std::collections::BTreeMap;
use std::io::{self, Read};

use bstr::BString;
use bytes::Bytes;
use tracing::trace;

use super::writer::padding_len;
use super::{NAR_VERSION_MAGIC, NarEvent, NarNode};
use crate::ByteString;
use crate::error::{NarError, Result};

/// Longest token other than file contents. Symlink targets are bounded by
/// `PATH_MAX`.
const MAX_TOKEN_LEN: u64 = 4096;

/// Deepest directory nesting accepted, which bounds the parser's recursion.
pub const MAX_NAR_DEPTH: usize = 1024;

/// Pull parser for the NAR token stream.
///
/// The grammar is enforced strictly: padding must be zero, directory entries
/// must be in strictly ascending byte order and names may not be empty,
/// `.`, `..`, or contain `/` or NUL.
pub struct NarParser<R> {
    reader: R,
}

impl<R: Read> NarParser<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Parse the whole archive, handing each event to `sink`. File contents
    /// are streamed: the reader in a `File` event yields exactly `size`
    /// bytes and whatever the sink leaves unread is skipped.
    pub fn parse<F>(mut self, mut sink: F) -> Result<R>
    where
        F: FnMut(NarEvent<&mut dyn Read>) -> Result<()>,
    {
        let magic = self.read_token()?;
        if magic != NAR_VERSION_MAGIC {
            return Err(NarError::BadMagic(BString::from(magic.to_vec())));
        }
        self.parse_node(Bytes::new(), 0, &mut sink)?;
        Ok(self.reader)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.reader.read_exact(buf).map_err(NarError::Read)
    }

    fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn read_padding(&mut self, len: u64) -> Result<()> {
        let mut buf = [0u8; 8];
        let padding = &mut buf[..padding_len(len)];
        self.read_exact(padding)?;
        if padding.iter().any(|b| *b != 0) {
            return Err(NarError::NonZeroPadding(len));
        }
        Ok(())
    }

    fn read_token(&mut self) -> Result<Bytes> {
        let len = self.read_u64()?;
        if len > MAX_TOKEN_LEN {
            return Err(NarError::TokenTooLong(len));
        }
        let mut buf = vec![0u8; len as usize];
        self.read_exact(&mut buf)?;
        self.read_padding(len)?;
        Ok(Bytes::from(buf))
    }

    fn expect(&mut self, expected: &[u8]) -> Result<()> {
        let actual = self.read_token()?;
        if actual != expected {
            return Err(unexpected(expected, &actual));
        }
        Ok(())
    }

    fn parse_node<F>(&mut self, name: ByteString, depth: usize, sink: &mut F) -> Result<()>
    where
        F: FnMut(NarEvent<&mut dyn Read>) -> Result<()>,
    {
        if depth > MAX_NAR_DEPTH {
            return Err(NarError::TooDeep(MAX_NAR_DEPTH));
        }
        self.expect(b"(")?;
        self.expect(b"type")?;
        let node_type = self.read_token()?;
        match &node_type[..] {
            b"regular" => {
                let mut key = self.read_token()?;
                let mut executable = false;
                if key == b"executable"[..] {
                    self.expect(b"")?;
                    executable = true;
                    key = self.read_token()?;
                }
                if key != b"contents"[..] {
                    return Err(unexpected(b"contents", &key));
                }
                let size = self.read_u64()?;
                trace!(name = ?BString::from(name.to_vec()), size, executable, "file");
                let mut contents = (&mut self.reader).take(size);
                let reader: &mut dyn Read = &mut contents;
                sink(NarEvent::File {
                    name,
                    executable,
                    size,
                    reader,
                })?;
                io::copy(&mut contents, &mut io::sink()).map_err(NarError::Read)?;
                if contents.limit() > 0 {
                    return Err(NarError::Read(io::ErrorKind::UnexpectedEof.into()));
                }
                self.read_padding(size)?;
                self.expect(b")")
            }
            b"symlink" => {
                self.expect(b"target")?;
                let target = self.read_token()?;
                self.expect(b")")?;
                sink(NarEvent::Symlink { name, target })
            }
            b"directory" => {
                sink(NarEvent::StartDirectory { name })?;
                let mut previous: Option<Bytes> = None;
                loop {
                    let key = self.read_token()?;
                    if key == b")"[..] {
                        break;
                    }
                    if key != b"entry"[..] {
                        return Err(unexpected(b"entry", &key));
                    }
                    self.expect(b"(")?;
                    self.expect(b"name")?;
                    let entry_name = self.read_token()?;
                    validate_name(&entry_name)?;
                    if let Some(previous) = previous.as_ref().filter(|p| **p >= entry_name) {
                        return Err(NarError::UnsortedEntry {
                            previous: BString::from(previous.to_vec()),
                            name: BString::from(entry_name.to_vec()),
                        });
                    }
                    self.expect(b"node")?;
                    self.parse_node(entry_name.clone(), depth + 1, sink)?;
                    self.expect(b")")?;
                    previous = Some(entry_name);
                }
                sink(NarEvent::EndDirectory)
            }
            _ => Err(NarError::UnknownNodeType(BString::from(node_type.to_vec()))),
        }
    }
}

fn unexpected(expected: &[u8], actual: &[u8]) -> NarError {
    NarError::UnexpectedToken {
        expected: BString::from(expected),
        actual: BString::from(actual),
    }
}

fn validate_name(name: &[u8]) -> Result<()> {
    if name.is_empty()
        || name == b"."
        || name == b".."
        || name.contains(&b'/')
        || name.contains(&0)
    {
        return Err(NarError::InvalidName(BString::from(name)));
    }
    Ok(())
}

/// Read a whole archive into memory.
pub fn parse_nar_tree<R: Read>(reader: R) -> Result<NarNode> {
    let mut stack: Vec<(ByteString, BTreeMap<ByteString, NarNode>)> = Vec::new();
    let mut root = None;

    let mut place = |stack: &mut Vec<(ByteString, BTreeMap<ByteString, NarNode>)>,
                     name: ByteString,
                     node: NarNode| match stack.last_mut() {
        Some((_, entries)) => {
            entries.insert(name, node);
        }
        None => root = Some(node),
    };

    NarParser::new(reader).parse(|event| {
        match event {
            NarEvent::File {
                name,
                executable,
                size,
                reader,
            } => {
                let mut contents = Vec::with_capacity(size.min(1 << 20) as usize);
                reader.read_to_end(&mut contents).map_err(NarError::Read)?;
                place(&mut stack, name, NarNode::regular(executable, contents));
            }
            NarEvent::Symlink { name, target } => {
                place(&mut stack, name, NarNode::symlink(target));
            }
            NarEvent::StartDirectory { name } => stack.push((name, BTreeMap::new())),
            NarEvent::EndDirectory => {
                if let Some((name, entries)) = stack.pop() {
                    place(&mut stack, name, NarNode::Directory(entries));
                }
            }
        }
        Ok(())
    })?;

    root.ok_or_else(|| NarError::Read(io::ErrorKind::UnexpectedEof.into()))
}


#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::*;
    use crate::archive::NarWriter;
    use crate::test::arbitrary::arb_nar_node;

    proptest! {
        #[test]
        fn proptest_parse_write(node in arb_nar_node(4, 32, 6)) {
            let mut writer = NarWriter::new(Vec::new());
            writer.write_node(&node).unwrap();
            let nar = writer.finish().unwrap();
            prop_assert_eq!(parse_nar_tree(&nar[..]).unwrap(), node);
        }
    }
}
