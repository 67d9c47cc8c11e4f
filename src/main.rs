// QueryDeck - Main Entry Point
//
// Command-line front end for the QueryDeck API boundary:
// - serve: run the HTTP API behind the per-client rate limiters
// - policy: print the effective general and auth admission policies

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use querydeck::config::{Config, LoggingConfig};
use querydeck::rate_limit::RateLimitPolicy;
use querydeck::server;
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// QueryDeck: SQL dashboard API with per-client admission control
#[derive(Parser, Debug)]
#[command(name = "querydeck")]
#[command(author = "QueryDeck Contributors")]
#[command(version = "0.1.0")]
#[command(about = "SQL dashboard API with per-client rate limiting", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to config file (default: ~/.config/querydeck/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the API server
    Serve {
        /// Override the listen address
        #[arg(long)]
        bind: Option<String>,
    },
    /// Print the effective rate limit policies as JSON
    Policy,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(Config::config_path);
    let mut config = Config::load_from_path(&config_path)?;

    init_tracing(&config.logging, args.verbose)?;
    config.log_loaded(&config_path);

    match args.command {
        Some(Commands::Serve { bind }) => {
            if let Some(bind) = bind {
                config.server.bind_addr = bind;
                config.validate()?;
            }
            info!("QueryDeck v{} starting...", env!("CARGO_PKG_VERSION"));
            server::serve(&config).await?;
        }
        Some(Commands::Policy) => {
            print_policies(&config)?;
        }
        None => {
            info!("No command specified. Use \"querydeck --help\" for usage.");
        }
    }

    Ok(())
}

fn init_tracing(logging: &LoggingConfig, verbose: bool) -> Result<()> {
    let level = if verbose {
        Level::DEBUG
    } else {
        logging
            .level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))?
    };

    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match logging.format.to_lowercase().as_str() {
        "json" => builder.json().init(),
        "pretty" => builder.pretty().init(),
        _ => builder.compact().init(),
    }

    Ok(())
}

fn print_policies(config: &Config) -> Result<()> {
    let general = RateLimitPolicy::from_config(&config.rate_limit)
        .context("Invalid rate limit configuration")?;
    let auth = general
        .derive_auth(&config.rate_limit.auth)
        .context("Invalid auth rate limit configuration")?;

    let output = json!({
        "general": general,
        "auth": auth,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
