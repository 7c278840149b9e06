//! dcx-action: CI bootstrap for the dcx scanner
//!
//! Reads its configuration from the environment (`GITHUB_TOKEN`, `DCX_TAG`,
//! `REPO_PATH`, `SCANNER_DIR`, `AI_ENDPOINT`, ...), installs the requested dcx
//! release, runs `dcx full-pipeline` and reports where the scan landed.
//!
//! ## Exit codes
//!
//! - `0`: success, including a missing scan directory or a poll timeout
//! - `1`: I/O failure
//! - `2`: configuration
//! - `3`: network
//! - `4`: unexpected response format
//! - `5`: installation
//! - `6`: pipeline

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, Level};

use dcx_action_core::{
    init_tracing, Bootstrap, BootstrapError, Config, FsOutputRepository, ReqwestTransport,
    TokioProcessRunner,
};

#[derive(Parser)]
#[command(name = "dcx-action")]
#[command(author = "DQX-AI")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Install dcx, run its full pipeline and collect the results", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(
        long,
        env = "DCX_LOG_JSON",
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    json: bool,

    /// Print the run report as JSON instead of summary lines
    #[arg(long)]
    report_json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("[dcx-action] error: {err:#}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    debug!(?config, "Configuration loaded");

    let transport =
        ReqwestTransport::new(config.http_timeout).context("Failed to build HTTP client")?;
    let runner = TokioProcessRunner::new();

    let report = Bootstrap::new(&transport, &runner, &FsOutputRepository)
        .run(&config)
        .await?;

    if cli.report_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in report.summary_lines() {
            println!("{line}");
        }
    }
    Ok(())
}

/// Exit code of the first `BootstrapError` in the chain, or 1.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|e| e.downcast_ref::<BootstrapError>())
        .map(BootstrapError::exit_code)
        .unwrap_or(1)
}
