// SPDX-FileCopyrightText: 2024 griff (original Nix.rs)
// SPDX-FileCopyrightText: 2025 Jörg Thalheim (Harmonia adaptation)
// SPDX-License-Identifier: EUPL-1.2 OR MIT

use std::ffi::OsStr;
use std::fs;
use std::io::{self, Read};
use std::os::unix::ffi::OsStrExt as _;
use std::os::unix::fs::OpenOptionsExt as _;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use super::{NarEvent, NarParser, open_nar};
use crate::error::{IoContext as _, NarError, NarOperation, Result};

/// Recreates an archive on the filesystem.
///
/// Nothing is overwritten: the destination and everything below it must not
/// exist yet. Executable files are created with mode `0o777`, other files
/// with `0o666`, both subject to the umask.
pub struct NarRestorer {
    path: PathBuf,
}

impl NarRestorer {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Process a single NAR event, writing to the filesystem.
    pub fn process_event<R: Read>(&mut self, event: NarEvent<R>) -> Result<()> {
        match event {
            NarEvent::File {
                name,
                executable,
                size,
                mut reader,
            } => {
                let path = join_name(&self.path, &name);
                trace!(path = %path.display(), size, executable, "creating file");
                let mut file = fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .mode(if executable { 0o777 } else { 0o666 })
                    .open(&path)
                    .io_context(NarOperation::CreateFile, &path)?;
                io::copy(&mut reader, &mut file).io_context(NarOperation::CreateFile, &path)?;
            }
            NarEvent::Symlink { name, target } => {
                let path = join_name(&self.path, &name);
                std::os::unix::fs::symlink(OsStr::from_bytes(&target), &path)
                    .io_context(NarOperation::CreateSymlink, &path)?;
            }
            NarEvent::StartDirectory { name } => {
                self.path = join_name(&self.path, &name);
                fs::create_dir(&self.path).io_context(NarOperation::CreateDirectory, &self.path)?;
            }
            NarEvent::EndDirectory => {
                self.path.pop();
            }
        }
        Ok(())
    }

    /// Parse the archive from `reader` and restore it. Returns the reader
    /// positioned after the archive.
    pub fn restore<R: Read>(mut self, reader: R) -> Result<R> {
        NarParser::new(reader).parse(|event| self.process_event(event))
    }
}

fn join_name(path: &Path, name: &[u8]) -> PathBuf {
    if name.is_empty() {
        path.to_owned()
    } else {
        path.join(OsStr::from_bytes(name))
    }
}

/// Unpack the archive at `nar_path` (plain, `.xz` or `.bz2`) to `dest`.
///
/// An archive of a single file or symlink unpacks to a file or symlink at
/// `dest`.
pub fn nar_unpack(nar_path: impl AsRef<Path>, dest: impl AsRef<Path>) -> Result<()> {
    let nar_path = nar_path.as_ref();
    let dest = dest.as_ref();
    debug!(nar = %nar_path.display(), dest = %dest.display(), "unpacking");
    let mut rest = NarRestorer::new(dest).restore(open_nar(nar_path)?)?;
    // Drain the input so that compressed streams verify their trailer
    io::copy(&mut rest, &mut io::sink()).map_err(NarError::Read)?;
    Ok(())
}
