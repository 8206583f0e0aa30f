//! Storyline CLI
//!
//! # Commands
//!
//! - `serve` - Run the realtime gateway over newline-delimited JSON on TCP
//! - `window` - Print the current story window
//! - `opening` - Print the current Opening state
//! - `delete` - Remove one token and close the gap (moderation)

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use storyline_core::{default_log_level, init_logging};

/// Shared story server and tools.
#[derive(Parser)]
#[command(name = "storyline")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the SQLite database file
    #[arg(global = true, long, env = "STORYLINE_DB", default_value = "storyline.db")]
    db: PathBuf,

    /// Absolute directory for rolling log files; logging is off when unset
    #[arg(global = true, long, env = "STORYLINE_LOG_DIR")]
    log_dir: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(global = true, long, env = "STORYLINE_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the realtime gateway
    Serve {
        /// Address to listen on
        #[arg(long, env = "STORYLINE_BIND", default_value = "127.0.0.1:7878")]
        bind: String,

        /// Writer credentials as `token=user_id` pairs, comma separated
        #[arg(long, env = "STORYLINE_WRITER_TOKENS", default_value = "")]
        writer_tokens: String,
    },

    /// Print the current window as JSON
    Window,

    /// Print the current Opening state as JSON
    Opening,

    /// Delete the token at a position and close the gap
    Delete {
        /// One-based position to remove
        #[arg(long)]
        position: i64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(log_dir) = cli.log_dir.as_deref() {
        let level = cli
            .log_level
            .clone()
            .unwrap_or_else(|| default_log_level().as_str().to_string());
        init_logging(&level, log_dir)?;
    }

    match cli.command {
        Commands::Serve {
            bind,
            writer_tokens,
        } => {
            let config = commands::serve::ServeConfig::new(cli.db, bind, &writer_tokens);
            commands::serve::run(config).await?;
        }
        Commands::Window => commands::inspect::window(&cli.db).await?,
        Commands::Opening => commands::inspect::opening()?,
        Commands::Delete { position } => commands::inspect::delete(&cli.db, position).await?,
    }

    Ok(())
}
