use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;
use xlconv::config::Settings;
use xlconv::convert::{self, ConvertArgs};
use xlconv::routes;
use xlconv_core::{Orchestrator, TransformEngine};

#[derive(Parser, Debug)]
#[command(author, version, about = "Spreadsheet field conversion service", long_about = None)]
struct Cli {
    /// Optional TOML file with `bind_addr` and `max_upload_bytes`
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP upload API
    Serve(ServeArgs),
    /// Convert local files and write the results to a directory
    Convert(ConvertArgs),
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Address to listen on, overrides XLCONV_BIND_ADDR
    #[arg(long)]
    bind: Option<SocketAddr>,
    /// Request body ceiling in bytes, overrides XLCONV_MAX_UPLOAD_BYTES
    #[arg(long)]
    max_upload_bytes: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Command::Serve(args) => {
            if let Some(bind) = args.bind {
                settings.bind_addr = bind;
            }
            if let Some(limit) = args.max_upload_bytes {
                settings.max_upload_bytes = limit;
            }
            routes::serve(settings).await
        }
        Command::Convert(args) => {
            let handle = Orchestrator::spawn(TransformEngine::default());
            let report = convert::run(&handle, &args).await?;

            println!("{}", report.table());
            let failed = report.failed();
            if !report.skipped.is_empty() {
                warn!(skipped = report.skipped.len(), "some inputs were not submitted");
            }
            if failed > 0 {
                bail!("{failed} of {} files failed to convert", report.rows.len());
            }
            Ok(())
        }
    }
}
