// SPDX-FileCopyrightText: 2025 Jörg Thalheim
// SPDX-License-Identifier: MIT

use std::ffi::OsStr;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use derive_more::Display;
use tracing::debug;

use crate::error::{IoContext as _, NarOperation, Result};

/// Compression of an archive file, chosen by its extension.
#[derive(Display, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Compression {
    #[default]
    #[display("none")]
    None,
    #[display("xz")]
    Xz,
    #[display("bzip2")]
    Bzip2,
}

impl Compression {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(OsStr::to_str) {
            Some("xz") => Compression::Xz,
            Some("bz2") => Compression::Bzip2,
            _ => Compression::None,
        }
    }

    pub fn decoder<'a, R: Read + 'a>(self, reader: R) -> Box<dyn Read + 'a> {
        match self {
            Compression::None => Box::new(reader),
            Compression::Xz => Box::new(xz2::read::XzDecoder::new(reader)),
            Compression::Bzip2 => Box::new(bzip2::read::BzDecoder::new(reader)),
        }
    }
}

/// Open an archive file for reading, decompressing `.xz` and `.bz2`
/// files on the fly.
pub fn open_nar(path: &Path) -> Result<Box<dyn Read>> {
    let file = File::open(path).io_context(NarOperation::OpenArchive, path)?;
    let compression = Compression::from_path(path);
    debug!(path = %path.display(), %compression, "opening archive");
    Ok(compression.decoder(BufReader::new(file)))
}

#[cfg(test)]
mod unittests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::plain("out.nar", Compression::None)]
    #[case::xz("out.nar.xz", Compression::Xz)]
    #[case::bz2("out.nar.bz2", Compression::Bzip2)]
    #[case::zstd("out.nar.zst", Compression::None)]
    #[case::no_extension("archive", Compression::None)]
    fn test_from_path(#[case] path: &str, #[case] expected: Compression) {
        assert_eq!(Compression::from_path(Path::new(path)), expected);
    }
}
