mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use commands::Overrides;

#[derive(Parser)]
#[command(
    name = "anvil",
    about = "Incremental buildpack deploys: upload what changed, build, release"
)]
#[command(version)]
struct Cli {
    /// Project directory containing anvil.toml
    #[arg(long, short = 'C', global = true, default_value = ".")]
    dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload changed files, build remotely, and release the slug
    Push {
        #[command(flatten)]
        overrides: Overrides,
        /// Print progress events as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Bundle the workspace into one archive and release it
    Archive {
        #[command(flatten)]
        overrides: Overrides,
        /// Print progress events as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Show what a push would upload, without uploading
    Diff {
        #[command(flatten)]
        overrides: Overrides,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate configuration without network access
    Check {
        #[command(flatten)]
        overrides: Overrides,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                // arch-lint: allow(no-silent-result-drop) reason="unset or invalid RUST_LOG falls back to info"
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let dotenv_loaded = dotenvy::from_path(cli.dir.join(".env")).is_ok();
    tracing::debug!(dotenv = dotenv_loaded, dir = %cli.dir.display(), "starting");

    match cli.command {
        Commands::Push { overrides, json } => commands::push(&cli.dir, &overrides, json).await?,
        Commands::Archive { overrides, json } => {
            commands::archive(&cli.dir, &overrides, json).await?
        }
        Commands::Diff { overrides, json } => commands::diff(&cli.dir, &overrides, json).await?,
        Commands::Check { overrides } => commands::check(&cli.dir, &overrides)?,
    }

    Ok(())
}
