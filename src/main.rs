//! paivoice - local notification relay
//!
//! Run with `paivoice` or `paivoice serve` to start the server.
//! Use `paivoice config` to show the effective configuration, and
//! `paivoice config --init` to write a default config file.

use clap::Parser;
use paivoice::cli::{Cli, Commands};
use paivoice::config::{self, Config};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("paivoice={},warn", log_level))),
        )
        .with_target(false)
        .init();

    // Load configuration
    let mut config = config::load_config(cli.config.as_deref())?;

    // Apply CLI overrides
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(dir) = cli.public_dir {
        config.server.public_dir = Some(dir);
    }
    if cli.play_locally {
        config.playback.enabled = true;
    }

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(&config).await?,
        Commands::Config { init } => {
            if init {
                init_config(cli.config.as_deref())?;
            }
            show_config(&config);
        }
    }

    Ok(())
}

async fn serve(config: &Config) -> anyhow::Result<()> {
    let handle = paivoice::service::start(config).await?;
    let port = handle.addr().port();

    tracing::info!("PAIVoice server listening on {}", handle.addr());
    tracing::info!(
        "Voice: ElevenLabs (model {}, voice {})",
        config.provider.model,
        config.provider.voice_id
    );
    tracing::info!(
        "API key: {}",
        if config.provider.has_api_key() {
            "configured"
        } else {
            "missing (notifications will be silent)"
        }
    );
    tracing::info!("POST to http://localhost:{}/notify or /pai", port);
    tracing::info!("WebSocket clients connect to ws://localhost:{}/ws", port);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    handle.shutdown().await;

    Ok(())
}

/// Write the default config file to the chosen or default path
fn init_config(path: Option<&std::path::Path>) -> anyhow::Result<()> {
    let Some(path) = path.map(PathBuf::from).or_else(Config::default_path) else {
        anyhow::bail!("Could not determine a config file location");
    };

    if Config::write_default(&path)? {
        println!("Created default config at {:?}\n", path);
    } else {
        println!("Config already exists at {:?}\n", path);
    }
    Ok(())
}

/// Show current configuration
fn show_config(config: &Config) {
    println!("Current Configuration\n");
    println!("=====================\n");

    println!("[server]");
    println!("  host = {:?}", config.server.host);
    println!("  port = {}", config.server.port);
    println!("  public_dir = {:?}", config.server.public_dir);
    println!("  max_body_bytes = {}", config.server.max_body_bytes);

    println!("\n[provider]");
    println!("  api_key = {}", mask_key(config.provider.api_key.as_deref()));
    println!("  voice_id = {:?}", config.provider.voice_id);
    println!("  model = {:?}", config.provider.model);
    println!("  base_url = {:?}", config.provider.base_url);
    println!("  timeout_secs = {}", config.provider.timeout_secs);

    println!("\n[rate_limit]");
    println!("  max_requests = {}", config.rate_limit.max_requests);
    println!("  window_ms = {}", config.rate_limit.window_ms);
    println!("  max_origins = {}", config.rate_limit.max_origins);

    println!("\n[playback]");
    println!("  enabled = {}", config.playback.enabled);
    println!("  timeout_secs = {}", config.playback.timeout_secs);

    println!("\n[notifier]");
    println!("  enabled = {}", config.notifier.enabled);
    println!("  timeout_secs = {}", config.notifier.timeout_secs);

    println!("\n---");
    println!(
        "Config file: {:?}",
        Config::default_path().unwrap_or_else(|| PathBuf::from("(not found)"))
    );
    println!(
        "Env file: {:?}",
        Config::dotenv_path().unwrap_or_else(|| PathBuf::from("(not found)"))
    );
}

/// Keep only the last four characters of a key
fn mask_key(key: Option<&str>) -> String {
    match key.map(str::trim).filter(|k| !k.is_empty()) {
        None => "(not set)".to_string(),
        Some(k) if k.chars().count() <= 4 => "****".to_string(),
        Some(k) => {
            let tail: String = k.chars().skip(k.chars().count() - 4).collect();
            format!("****{}", tail)
        }
    }
}
