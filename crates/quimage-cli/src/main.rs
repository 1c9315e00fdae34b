//! quimage CLI entry point

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use quimage_cli::{commands, Cli, Commands};
use quimage_core::Verbosity;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let fallback = Verbosity::from_occurrences(cli.global.verbose).tracing_filter();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    let global = cli.global;
    match cli.command {
        Commands::List(args) => commands::execute_list(&global, args)?,
        Commands::Encode(args) => commands::execute_encode(&global, args)?,
        Commands::Simulate(args) => commands::execute_simulate(&global, args).await?,
        Commands::Retrieve(args) => commands::execute_retrieve(&global, args)?,
        Commands::Version => {
            println!("quimage {}", env!("CARGO_PKG_VERSION"));
            println!("core library version: {}", quimage_core::VERSION);
        }
    }

    Ok(())
}
