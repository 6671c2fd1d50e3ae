//! inkpost-diagnose: exercise a running Inkpost server and print the results as JSON

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use inkpost::core::diagnostics::{
    DiagnosticsClient, DiagnosticsError, FileTokenStore, MemoryTokenStore, TokenStore,
};

#[derive(Parser)]
#[command(name = "inkpost-diagnose")]
#[command(about = "Check health, tokens and post creation against an Inkpost server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Server base URL
    #[arg(long, global = true, env = "INKPOST_BASE_URL", default_value = "http://localhost:3000")]
    base_url: String,

    /// JSON file holding the access token between runs (in-memory when omitted)
    #[arg(long, global = true, env = "INKPOST_TOKEN_FILE")]
    token_file: Option<PathBuf>,

    /// Access token to seed the store with
    #[arg(long, global = true, env = "INKPOST_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Refresh token sent as the `refreshToken` cookie
    #[arg(long, global = true, env = "INKPOST_REFRESH_TOKEN", hide_env_values = true)]
    refresh_token: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, global = true, default_value_t = 10)]
    timeout_secs: u64,
}

#[derive(Subcommand)]
enum Command {
    /// GET /health
    Health,
    /// Check the stored access token
    Token,
    /// Exchange the refresh token for a new access token
    Refresh,
    /// Create a sample draft post
    Post,
    /// Run every check
    All,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(2);
        }
    }
}

/// Returns whether every requested check passed
async fn run(cli: Cli) -> Result<bool, DiagnosticsError> {
    let store: Arc<dyn TokenStore> = match &cli.token_file {
        Some(path) => Arc::new(FileTokenStore::new(path)),
        None => Arc::new(MemoryTokenStore::new()),
    };
    if let Some(token) = &cli.access_token {
        store.set(token)?;
    }

    let mut client = DiagnosticsClient::with_timeout(
        &cli.base_url,
        store,
        Duration::from_secs(cli.timeout_secs),
    )?;
    if let Some(refresh) = cli.refresh_token {
        client = client.with_refresh_token(refresh);
    }

    let (output, passed) = match cli.command {
        Command::Health => outcome_json(client.check_health().await)?,
        Command::Token => outcome_json(client.check_token().await)?,
        Command::Refresh => outcome_json(client.refresh_token().await)?,
        Command::Post => outcome_json(client.test_post_creation().await)?,
        Command::All => {
            let report = client.run_all().await;
            (serde_json::to_string_pretty(&report)?, report.all_passed())
        }
    };

    println!("{output}");
    Ok(passed)
}

fn outcome_json(
    outcome: inkpost::core::diagnostics::CheckOutcome,
) -> Result<(String, bool), DiagnosticsError> {
    Ok((serde_json::to_string_pretty(&outcome)?, outcome.success))
}
