// Main binary that starts the provisioning server
use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about = "Kestrel zero-touch provisioning", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Verbose output - shows more detailed logs
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs the provisioning server (default action).
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    // Respect RUST_LOG, fall back to info (or debug with --verbose) for our
    // crates while keeping the HTTP stack quiet.
    let default_level = if cli.verbose { "debug" } else { "info" };
    let default_directives = format!(
        "kestrel={level},kestrel_server={level},kestrel_ztp={level},tower=warn,hyper=warn,reqwest=warn,rustls=warn",
        level = default_level
    );
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    match cli.command {
        Some(Commands::Serve) | None => kestrel_server::run()
            .await
            .map_err(|e| eyre!("{e:#}"))?,
    }

    Ok(())
}
