mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "wecode-cli")]
#[command(about = "WeCode CLI - Run code through the sandboxed execution engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a source file in its language sandbox
    Run {
        /// Language identifier (e.g., python, cpp, java)
        #[arg(short, long)]
        language: String,

        /// Source file to execute
        file: PathBuf,

        /// File whose contents become the program's standard input
        #[arg(short, long)]
        stdin: Option<PathBuf>,

        /// Print the full result as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// List supported languages
    Languages,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            language,
            file,
            stdin,
            json,
        } => {
            let succeeded = commands::run_file(&language, &file, stdin.as_deref(), json).await?;
            if !succeeded {
                std::process::exit(1);
            }
        }
        Commands::Languages => {
            commands::list_languages()?;
        }
    }

    Ok(())
}
