#![cfg_attr(not(test), deny(clippy::panic))]

use std::path::PathBuf;

use clap::Parser;

use shardfish_server::config;
use shardfish_server::logging;
use shardfish_server::server::ShardServer;

/// Shardfish -- multi-service shard server for MOUL-lineage MMO clients
#[derive(Parser, Debug)]
#[command(name = "shardfish-server")]
#[command(about = "A multi-service shard server for MOUL-lineage MMO clients")]
#[command(version)]
struct Cli {
    /// Path to the settings file.
    #[arg(long, short = 'f', default_value = "shardfish.ini")]
    config: PathBuf,

    /// Validate configuration and exit without starting the server.
    #[arg(long, short = 'c', conflicts_with = "print_config")]
    validate_config: bool,

    /// Print the loaded configuration to stdout (as JSON) and exit. Key
    /// material and credentials are omitted.
    #[arg(long, conflicts_with = "validate_config")]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load(&cli.config)
        .map_err(|e| anyhow::anyhow!("failed to load {}: {e}", cli.config.display()))?;

    if cli.print_config {
        let json = serde_json::to_string_pretty(&cfg)
            .map_err(|e| anyhow::anyhow!("failed to serialize config: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    let validation_result = config::validate(&cfg);
    if cli.validate_config {
        match validation_result {
            Ok(()) => {
                println!("Configuration validation passed");
                println!();
                println!("Configuration summary:");
                println!("  Lobby: {}", cfg.lobby_bind());
                println!("  Status endpoint: {}", cfg.status_bind());
                println!("  Database: {}:{}/{}", cfg.db.host, cfg.db.port, cfg.db.database);
                println!("  Age descriptors: {}", cfg.age_path);
                println!("  SDL descriptors: {}", cfg.sdl_path);
                println!("  File root: {}", cfg.file_root);
                println!("  Client build id: {}", cfg.build_id);
                println!("  Restricted logins: {}", cfg.restrict_logins);
                return Ok(());
            }
            Err(e) => {
                eprintln!("Configuration validation failed:\n{e}");
                std::process::exit(1);
            }
        }
    }
    validation_result?;

    logging::init(None);

    tracing::info!(lobby = %cfg.lobby_bind(), "Starting Shardfish server");
    let server = ShardServer::start(cfg).await?;

    tokio::signal::ctrl_c().await?;
    server.stop().await;

    Ok(())
}
