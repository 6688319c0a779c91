//! CLI entry point - the composition root.
//!
//! Loads `.env`, parses arguments, resolves settings, and dispatches to a
//! handler. Errors are reported once here, with a sysexits-style code.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use flashtalk_cli::{Cli, CliError, Commands, handlers, load_settings};

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // Logs go to stderr; stdout carries the answer.
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .ok();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = load_settings(&cli)?;

    match cli.command {
        Commands::Ask {
            card,
            chunk,
            voice: _,
            prompt,
        } => handlers::ask::execute(&settings, card, chunk, &prompt).await,
        Commands::Resume {
            card,
            session_id,
            partial,
        } => handlers::resume::execute(&settings, card, session_id, partial).await,
        Commands::Interrupt { session_id } => {
            handlers::interrupt::execute(&settings, session_id).await
        }
    }
}

#[tokio::main]
async fn main() {
    // Load environment variables before clap reads FLASHTALK_*
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        let code = e.downcast_ref::<CliError>().map_or(1, CliError::exit_code);
        std::process::exit(code);
    }
}
