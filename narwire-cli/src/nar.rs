// SPDX-FileCopyrightText: 2025 Jörg Thalheim
// SPDX-License-Identifier: MIT

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use narwire_nar::{Nar, nar_unpack};
use narwire_utils_base_encoding::Base;
use narwire_utils_hash::Algorithm;
use tracing::info;

use crate::VcsArgs;
use crate::config::Config;
use crate::error::{IoErrorContext, Result};

pub(crate) struct Options {
    exclude_vcs: bool,
    vcs_type: String,
}

impl Options {
    pub(crate) fn resolve(args: &VcsArgs, config: &Config) -> Self {
        Options {
            exclude_vcs: args.exclude_vcs || config.exclude_vcs,
            vcs_type: args.vcs_type.clone().unwrap_or_else(|| config.vcs_type.clone()),
        }
    }

    fn nar(&self, algorithms: &[Algorithm]) -> Nar {
        Nar::new(algorithms.iter().copied())
            .exclude_vcs(self.exclude_vcs)
            .vcs_type(Some(self.vcs_type.as_str()))
    }
}

/// One algorithm prints the bare digest, several print `algo:digest` lines.
fn write_digests(
    mut out: impl Write,
    digests: &BTreeMap<Algorithm, String>,
) -> io::Result<()> {
    match digests.iter().collect::<Vec<_>>().as_slice() {
        [(_, digest)] => writeln!(out, "{digest}")?,
        all => {
            for (algorithm, digest) in all {
                writeln!(out, "{algorithm}:{digest}")?;
            }
        }
    }
    out.flush()
}

pub(crate) fn hash(
    path: &Path,
    options: &Options,
    algorithms: &[Algorithm],
    base: Base,
    debug: bool,
) -> Result<()> {
    let mut nar = options.nar(algorithms).debug(debug);
    let size = nar.serialize_to(path, io::sink())?;
    info!(path = %path.display(), size, "hashed archive");
    write_digests(io::stdout().lock(), &nar.digests().encoded(base))
        .io_context("writing digests")
}

pub(crate) fn serialize(path: &Path, options: &Options, output: Option<&Path>) -> Result<()> {
    let mut nar = options.nar(&[Algorithm::SHA256]);
    let size = match output {
        Some(output) => {
            let file = File::create(output)
                .io_context(format!("creating {}", output.display()))?;
            let mut writer = BufWriter::new(file);
            let size = nar.serialize_to(path, &mut writer)?;
            writer
                .flush()
                .io_context(format!("writing {}", output.display()))?;
            size
        }
        None => {
            let mut stdout = io::stdout().lock();
            let size = nar.serialize_to(path, &mut stdout)?;
            stdout.flush().io_context("writing archive to stdout")?;
            size
        }
    };
    if let Some(digest) = nar.digests().get(Algorithm::SHA256) {
        info!(path = %path.display(), size, sha256 = %digest.to_hex(), "wrote archive");
    }
    Ok(())
}

pub(crate) fn unpack(nar: &Path, dest: &Path) -> Result<()> {
    nar_unpack(nar, dest)?;
    info!(nar = %nar.display(), dest = %dest.display(), "unpacked archive");
    Ok(())
}
