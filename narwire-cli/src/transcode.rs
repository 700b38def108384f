// SPDX-FileCopyrightText: 2025 Jörg Thalheim
// SPDX-License-Identifier: MIT

use std::fs;
use std::io::{self, Read as _, Write as _};
use std::path::Path;

use narwire_codec::{Codec, Format};
use tracing::debug;

use crate::error::{IoErrorContext, Result};

fn read_input(input: Option<&Path>) -> Result<Vec<u8>> {
    match input {
        Some(path) => fs::read(path).io_context(format!("reading {}", path.display())),
        None => {
            let mut data = Vec::new();
            io::stdin()
                .lock()
                .read_to_end(&mut data)
                .io_context("reading stdin")?;
            Ok(data)
        }
    }
}

pub(crate) fn transcode(
    from: Format,
    to: Format,
    input: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let data = read_input(input)?;
    let codec = Codec::new();
    let value = codec.decode(&data, from)?;
    let encoded = codec.encode(&value, to)?;
    debug!(%from, %to, input = data.len(), output = encoded.len(), "transcoded");
    match output {
        Some(path) => fs::write(path, &encoded).io_context(format!("writing {}", path.display())),
        None => {
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(&encoded)
                .and_then(|()| stdout.flush())
                .io_context("writing stdout")
        }
    }
}
