use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Only log warnings and errors unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print a novel's title, author, volumes and chapter links as JSON.
    Info(InfoArgs),
    /// Fetch one chapter page and print its title and body markup as JSON.
    Chapter(ChapterArgs),
    /// Download the selected volumes and write EPUB files.
    Export(ExportArgs),
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Novel page URL (must be http/https).
    #[arg(long)]
    pub url: String,

    /// HTTP request timeout in seconds.
    #[arg(
        long,
        default_value_t = crate::scrape::DEFAULT_REQUEST_TIMEOUT.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub timeout_secs: u64,
}

#[derive(Debug, Args)]
pub struct ChapterArgs {
    /// Chapter page URL (must be http/https).
    #[arg(long)]
    pub url: String,

    /// HTTP request timeout in seconds.
    #[arg(
        long,
        default_value_t = crate::fetch::DEFAULT_PER_ITEM_TIMEOUT.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub timeout_secs: u64,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Novel page URL (must be http/https).
    #[arg(long)]
    pub url: String,

    /// Zero-based volume positions to export, comma separated. Defaults to every volume.
    #[arg(long, value_delimiter = ',')]
    pub volumes: Vec<usize>,

    /// Write one EPUB per volume instead of a single combined EPUB.
    #[arg(long)]
    pub split_volumes: bool,

    /// Output directory for EPUB files.
    #[arg(long, default_value = ".")]
    pub out: PathBuf,

    /// Overwrite existing EPUB files.
    #[arg(long)]
    pub force: bool,

    /// Maximum chapters fetched at the same time.
    #[arg(
        long,
        default_value_t = crate::fetch::DEFAULT_CONCURRENCY_LIMIT,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    pub concurrency: usize,

    /// Per-chapter timeout in seconds.
    #[arg(
        long,
        default_value_t = crate::fetch::DEFAULT_PER_ITEM_TIMEOUT.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub timeout_secs: u64,

    /// Language tag written into the package document.
    #[arg(long, default_value = crate::epub::DEFAULT_LANGUAGE)]
    pub lang: String,
}
