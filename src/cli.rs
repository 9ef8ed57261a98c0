//! command line interface

use crate::session::SessionOptions;
use clap::{Args, Parser, Subcommand};
use std::{path::PathBuf, time::Duration};

#[derive(Parser)]
#[command(
    name = "arcprobe",
    version,
    about = "arcprobe: archive format detection",
    long_about = "Detect the container format of a file by probing an ordered catalog of formats, look inside compressed wrappers (gz, xz, zst), and list the items of the archive found"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// verbose output (also raises the log level to debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// detect the archive format (and any format wrapped inside it)
    #[command(alias = "d")]
    Detect {
        /// file to inspect
        archive: PathBuf,

        #[command(flatten)]
        probe: ProbeArgs,
    },

    /// list archive contents
    #[command(alias = "l")]
    List {
        /// archive file to list
        archive: PathBuf,

        #[command(flatten)]
        probe: ProbeArgs,

        /// show progress bar while reading items
        #[arg(short = 'P', long)]
        progress: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ProbeArgs {
    /// password for encrypted archives
    #[arg(short = 'p', long, env = "ARCPROBE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// prompt for a password if a format asks for one
    #[arg(long)]
    pub ask_password: bool,

    /// do not look inside compressed wrappers
    #[arg(long)]
    pub no_resolve: bool,

    /// memory in MiB that may be used to buffer wrapped payloads
    #[arg(long, default_value = "256", value_parser = clap::value_parser!(u64).range(0..=65536))]
    pub max_substream_mb: u64,

    /// give up after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

impl ProbeArgs {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            password: self.password.clone(),
            ask_password: self.ask_password,
            resolve_sub_streams: !self.no_resolve,
            max_sub_stream_mb: self.max_substream_mb,
            timeout: self.timeout.map(Duration::from_secs),
        }
    }
}
