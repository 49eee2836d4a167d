//! Kitstream CLI
//!
//! Command-line interface for Kitstream operations:
//! - Issue tokens for kits and persons
//! - Check a token
//! - Generate a config file

use clap::{Parser, Subcommand};
use kitstream::auth::{JwtAuth, TokenVerifier};
use kitstream::config::{generate_default_config, Config};
use kitstream::directory::{InMemoryDirectory, KitDirectory};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "kitstream-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Operator tools for the Kitstream measurement server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a TOML config file (default: search standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Issue a token for a configured kit or person
    IssueToken {
        /// Username of the kit or person
        username: String,
        /// Token lifetime in seconds (default: auth.token_ttl_secs)
        #[arg(long)]
        ttl_secs: Option<u64>,
    },

    /// Verify a token and show who it belongs to
    VerifyToken {
        /// The token to check
        token: String,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::IssueToken { username, ttl_secs } => {
            let config = load_config(cli.config.as_ref())?;
            let directory = Arc::new(InMemoryDirectory::from_config(&config.directory));

            // Refuse to sign tokens nobody could use
            let principal = directory.resolve_principal(&username).await?;

            let auth = JwtAuth::from_config(&config.auth, directory);
            let ttl = Duration::from_secs(ttl_secs.unwrap_or(config.auth.token_ttl_secs));
            let token = auth.issue(&username, ttl)?;

            eprintln!("Issued token for {} (valid {}s)", principal, ttl.as_secs());
            println!("{}", token);
        }

        Commands::VerifyToken { token } => {
            let config = load_config(cli.config.as_ref())?;
            let directory = Arc::new(InMemoryDirectory::from_config(&config.directory));
            let auth = JwtAuth::from_config(&config.auth, directory);

            match auth.verify(&token).await {
                Ok(principal) => {
                    println!("{}", serde_json::to_string_pretty(&principal)?);
                }
                Err(e) => {
                    eprintln!("Token rejected: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Config { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)?;
                    eprintln!("Wrote default config to {}", path.display());
                }
                None => print!("{}", content),
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::load_with_env(path)?,
        None => {
            let (config, report) = Config::load_default();
            for error in &report.failures {
                eprintln!("Skipping config file: {}", error);
            }
            config
        }
    };
    config.validate()?;
    Ok(config)
}
