//! Command-line argument parsing.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use link2cos_ledger::DEFAULT_LEDGER_FILE;

use crate::config::DEFAULT_CONFIG_FILE;

/// Default directory for `download`.
pub const DEFAULT_OUTPUT_DIR: &str = "downloads";

/// link2cos - mirror remote files into a COS bucket.
#[derive(Debug, Parser)]
#[command(
    name = "link2cos",
    version,
    about = "Mirror remote files into a COS bucket, skipping links already transferred"
)]
pub struct Cli {
    /// Increase verbosity (-v enables debug logging)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Ledger of transferred links
    #[arg(long = "ledger", value_name = "PATH", default_value = DEFAULT_LEDGER_FILE, global = true)]
    pub ledger: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch every link in the input file and store it in the bucket
    Sync(SyncArgs),
    /// Fetch every link in the input file into a local directory
    Download(DownloadArgs),
    /// Upload one local file to the bucket
    Upload(UploadArgs),
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// File with one link per line (`#` starts a comment)
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    pub input: PathBuf,

    /// Configuration file
    #[arg(short = 'c', long = "config", value_name = "FILE", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
}

#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// File with one link per line (`#` starts a comment)
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    pub input: PathBuf,

    /// Directory the files are saved to
    #[arg(short = 'o', long = "output", value_name = "DIR", default_value = DEFAULT_OUTPUT_DIR)]
    pub output: PathBuf,

    /// Configuration file (only the [fetch] section is used; optional)
    #[arg(short = 'c', long = "config", value_name = "FILE", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
}

#[derive(Debug, Args)]
pub struct UploadArgs {
    /// Local file to upload
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    pub file: PathBuf,

    /// Object key (defaults to the file name)
    #[arg(short = 'p', long = "path", value_name = "KEY")]
    pub key: Option<String>,

    /// Configuration file
    #[arg(short = 'c', long = "config", value_name = "FILE", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
}
