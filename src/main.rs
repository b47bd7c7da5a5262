use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sluice::app::{AppContext, SluiceError};
use sluice::cli::{commands, Cli, Commands};
use sluice::config::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let settings = match cli.config {
        Some(ref path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };

    // RUST_LOG wins over the settings file
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.general.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let ctx = AppContext::new(settings, cli.db)?;

    match cli.command {
        Commands::Create(args) => {
            commands::create(&ctx, &args)?;
        }
        Commands::Delete { selection, yes } => {
            commands::delete(&ctx, &selection, yes)?;
        }
        Commands::Fetch { selection, force } => {
            match commands::fetch(&ctx, &selection, force).await {
                Ok(_) => {}
                Err(SluiceError::LockHeld(path)) => {
                    eprintln!(
                        "sluice is already running, the lock file exists: {}",
                        path.display()
                    );
                    return Ok(ExitCode::FAILURE);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::List { selection } => {
            commands::list(&ctx, &selection)?;
        }
        Commands::Set(args) => {
            commands::set(&ctx, &args)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
