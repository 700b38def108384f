// SPDX-FileCopyrightText: 2025 Jörg Thalheim
// SPDX-License-Identifier: MIT

#![warn(clippy::dbg_macro)]

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use narwire_codec::Format;
use narwire_utils_base_encoding::Base;
use narwire_utils_hash::Algorithm;
use tracing::error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

mod config;
mod error;
mod nar;
mod transcode;

use config::Config;
use error::Result;

#[derive(Parser)]
#[command(name = "narwire")]
#[command(about = "NAR archives and tagged JSON/msgpack payloads")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// NAR (Nix ARchive) utils
    Nar {
        #[command(subcommand)]
        command: NarCommands,
    },
    /// Tagged JSON and msgpack utils
    Codec {
        #[command(subcommand)]
        command: CodecCommands,
    },
}

#[derive(Args, Clone)]
struct VcsArgs {
    /// Exclude version control directories
    #[arg(short = 'x', long)]
    exclude_vcs: bool,

    /// Type of version control system to exclude directories
    #[arg(short = 't', long)]
    vcs_type: Option<String>,
}

#[derive(Subcommand)]
enum NarCommands {
    /// Compute the NAR hash of a path
    Hash {
        path: PathBuf,
        #[command(flatten)]
        vcs: VcsArgs,
        /// Digest algorithm, may be repeated
        #[arg(short = 'H', long = "hash-algo")]
        hash_algo: Vec<Algorithm>,
        /// hex, base32 or base64
        #[arg(short = 'f', long = "format-output")]
        format_output: Option<Base>,
        /// Log the archive structure while serializing
        #[arg(long)]
        debug: bool,
    },
    /// Write the NAR serialization of a path
    Serialize {
        path: PathBuf,
        #[command(flatten)]
        vcs: VcsArgs,
        /// Output file, stdout if omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Unpack a `.nar`, `.nar.xz` or `.nar.bz2` archive
    Unpack { nar: PathBuf, dest: PathBuf },
}

#[derive(Subcommand)]
enum CodecCommands {
    /// Decode a payload in one format and encode it in another
    Transcode {
        #[arg(long)]
        from: Format,
        #[arg(long)]
        to: Format,
        /// Input file, stdin if omitted
        input: Option<PathBuf>,
        /// Output file, stdout if omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_logging(default_filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Nar { command } => match command {
            NarCommands::Hash {
                path,
                vcs,
                hash_algo,
                format_output,
                debug,
            } => nar::hash(
                &path,
                &nar::Options::resolve(&vcs, config),
                if hash_algo.is_empty() {
                    &config.hash_algorithms
                } else {
                    &hash_algo
                },
                format_output.unwrap_or(config.output_format),
                debug,
            ),
            NarCommands::Serialize { path, vcs, output } => nar::serialize(
                &path,
                &nar::Options::resolve(&vcs, config),
                output.as_deref(),
            ),
            NarCommands::Unpack { nar, dest } => nar::unpack(&nar, &dest),
        },
        Commands::Codec { command } => match command {
            CodecCommands::Transcode {
                from,
                to,
                input,
                output,
            } => transcode::transcode(from, to, input.as_deref(), output.as_deref()),
        },
    }
}

fn main() -> ExitCode {
    let Cli { command } = Cli::parse();

    let config = config::load();
    let debug = matches!(
        command,
        Commands::Nar {
            command: NarCommands::Hash { debug: true, .. }
        }
    );
    let filter = match (&config, debug) {
        (_, true) => "debug",
        (Ok(config), false) => config.log_level.as_str(),
        (Err(_), false) => "info",
    };
    init_logging(filter);

    match config.and_then(|config| run(command, &config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
