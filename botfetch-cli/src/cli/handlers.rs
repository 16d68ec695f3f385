//! Handlers for CLI commands

use anyhow::{anyhow, Context, Result};
use botfetch_core::chat::GatewayClient;
use botfetch_core::models::Configuration;
use botfetch_core::server::RelayServer;
use botfetch_core::services::logging;
use std::path::PathBuf;
use std::sync::Arc;

/// Resolve the configuration path: explicit flag or the XDG default.
fn config_path(config_file: Option<String>) -> Result<PathBuf> {
    match config_file {
        Some(path) => Ok(PathBuf::from(path)),
        None => Configuration::default_config_path()
            .map_err(|e| anyhow!("could not resolve config path: {}", e)),
    }
}

fn load_config(config_file: Option<String>) -> Result<Configuration> {
    let path = config_path(config_file)?;
    Configuration::load_from_file(&path)
        .map_err(|e| anyhow!("failed to load configuration from {}: {}", path.display(), e))
}

/// Handle the serve command
pub async fn handle_serve(
    config_file: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    gateway_url: Option<String>,
    download_dir: Option<String>,
) -> Result<()> {
    let mut config = load_config(config_file)?;

    // Flag overrides win over file values.
    if let Some(host) = host {
        config.server_host = host;
    }
    if let Some(port) = port {
        config.server_port = port;
    }
    if let Some(gateway_url) = gateway_url {
        config.gateway_url = gateway_url;
    }
    if let Some(download_dir) = download_dir {
        config.download_dir = PathBuf::from(download_dir);
    }

    if let Err(errors) = config.validate() {
        return Err(anyhow!("invalid configuration:\n  {}", errors.join("\n  ")));
    }

    logging::init_logging(config.log_level.clone())
        .map_err(|e| anyhow!("failed to initialize logging: {}", e))?;

    let token = std::env::var("BOTFETCH_GATEWAY_TOKEN")
        .context("BOTFETCH_GATEWAY_TOKEN must be set")?;
    let client = Arc::new(GatewayClient::new(config.gateway_url.clone(), token));

    RelayServer::new(config, client).start().await
}

/// Handle config --init
pub fn handle_config_init(config_file: Option<String>) -> Result<()> {
    let path = config_path(config_file)?;
    if path.exists() {
        return Err(anyhow!("configuration already exists at {}", path.display()));
    }
    let config = Configuration::default();
    config
        .save_to_file(&path)
        .map_err(|e| anyhow!("failed to write {}: {}", path.display(), e))?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

/// Handle config --show
pub fn handle_config_show(config_file: Option<String>) -> Result<()> {
    let config = load_config(config_file)?;
    let rendered = toml::to_string_pretty(&config)?;
    println!("{}", rendered);
    Ok(())
}
