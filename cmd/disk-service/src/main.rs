use clap::Parser;
use std::process;

use disk_service::cli::{Cli, Commands};
use disk_service::commands;

#[tokio::main]
async fn main() {
    tracing_log::LogTracer::init().expect("Failed to set up LogTracer");

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");
    let cli = Cli::parse();

    if let Err(e) = match cli.command {
        Commands::Serve(args) => {
            tracing::info!("Serving {:?} disk", args.backend);
            commands::serve(args).await
        }
        Commands::EnsureBucket(args) => commands::ensure(args).await,
        Commands::Info { endpoint } => commands::info(&endpoint).await,
    } {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}
