//! Warden CLI - fetch and inspect mTLS access tokens
//!
//! Loads a manager configuration, obtains a live token through the shared
//! cache, and prints the token, request headers, or client configuration.
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;

use warden::{CredentialManager, IdempotencyKey};

mod config;
mod display;
mod retry;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (default: <config dir>/warden/config.toml)
    #[arg(long, short, env = "WARDEN_CONFIG")]
    config: Option<PathBuf>,

    /// Retries for transient token endpoint failures
    #[arg(long, default_value_t = 3, env = "WARDEN_MAX_RETRIES")]
    max_retries: u32,

    #[command(flatten)]
    overrides: config::Overrides,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a live access token
    Token,

    /// Print the headers for one authenticated request
    Headers {
        /// Idempotency key to send (default: freshly generated)
        #[arg(long)]
        idempotency_key: Option<String>,
    },

    /// Print the base URL, identity paths, and headers as JSON
    ClientConfig {
        /// Idempotency key to send (default: freshly generated)
        #[arg(long)]
        idempotency_key: Option<String>,
    },

    /// Drop the cached token so the next call fetches a new one
    Invalidate,
}

/// Initializes tracing on stderr so stdout carries only command output.
///
/// `WARDEN_LOG_FORMAT=json` switches to JSON lines; `RUST_LOG` sets the filter.
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,warden_cli=info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);

    if json_logs(std::env::var("WARDEN_LOG_FORMAT").ok().as_deref()) {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn json_logs(format: Option<&str>) -> bool {
    format.is_some_and(|format| format.trim().eq_ignore_ascii_case("json"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing();
    display::configure_colors();

    let config = config::load(args.config.as_deref(), &args.overrides)?;

    // Invalidation must not fetch a token first
    if matches!(args.command, Command::Invalidate) {
        let manager = CredentialManager::builder(config).build_deferred()?;
        manager.invalidate().await?;
        display::display_status(&format!(
            "Invalidated cached token '{}'",
            manager.cache_key()
        ));
        return Ok(());
    }

    let policy = retry::backoff(args.max_retries);
    let manager = retry::with_retry(&policy, || CredentialManager::initialize(config.clone()))
        .await
        .context("Failed to initialize credential manager")?;

    match args.command {
        Command::Token => {
            println!("{}", manager.token().await?.expose_secret());
        }
        Command::Headers { idempotency_key } => {
            let headers = manager
                .authorization_headers(idempotency_key.map(IdempotencyKey::from))
                .await?;
            display::display_headers(&headers);
        }
        Command::ClientConfig { idempotency_key } => {
            let config = manager
                .client_config(idempotency_key.map(IdempotencyKey::from))
                .await?;
            display::display_client_config(&config)?;
        }
        Command::Invalidate => {}
    }

    Ok(())
}
