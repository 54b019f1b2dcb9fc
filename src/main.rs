use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    let cli = novelbind::cli::Cli::parse();

    let default_directive = if cli.quiet {
        novelbind::logging::QUIET_DIRECTIVE
    } else {
        novelbind::logging::DEFAULT_DIRECTIVE
    };
    novelbind::logging::init(default_directive).context("init logging")?;
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        novelbind::cli::Command::Info(args) => {
            novelbind::scrape::info(args).await.context("info")?;
        }
        novelbind::cli::Command::Chapter(args) => {
            novelbind::scrape::chapter(args).await.context("chapter")?;
        }
        novelbind::cli::Command::Export(args) => {
            novelbind::export::run(args).await.context("export")?;
        }
    }

    Ok(())
}
