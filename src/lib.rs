pub mod commands;
pub mod config;
pub mod database;
pub mod errors;
pub mod favorites;
pub mod kv;
pub mod memory;
pub mod platform;
pub mod queue;

use anyhow::Context;
use clap::Parser;
use commands::Cli;
use config::FavoritesConfig;
use favorites::FavoritesStore;

pub use errors::FavoritesError;

/// Command-line entry point: one favorites command per invocation, JSON on stdout.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = FavoritesConfig::load();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(async {
        let (store, host) = FavoritesStore::from_config(&config)?;
        if config.platform == platform::Platform::Web {
            // no page to wait for when driven from the command line
            host.mark_persistence_ready();
        }
        store.initialize().await;

        let output = commands::execute(&store, cli.command).await;
        store.close().await;

        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok::<(), anyhow::Error>(())
    })
}
