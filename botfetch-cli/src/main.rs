mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cli::handlers;

#[derive(Parser)]
#[command(name = "botfetch")]
#[command(version = "0.1.0")]
#[command(about = "HTTP relay in front of a media-fetching chat bot")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay server
    Serve {
        /// Path to configuration file (defaults to the XDG config location)
        #[arg(long)]
        config_file: Option<String>,

        /// Server bind address (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Server port number (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Chat gateway base URL (overrides config)
        #[arg(long)]
        gateway_url: Option<String>,

        /// Download directory (overrides config)
        #[arg(long)]
        download_dir: Option<String>,
    },

    /// Configure botfetch settings
    Config {
        /// Write a default configuration file
        #[arg(long)]
        init: bool,

        /// Print the effective configuration
        #[arg(long)]
        show: bool,

        /// Path to configuration file (defaults to the XDG config location)
        #[arg(long)]
        config_file: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config_file,
            host,
            port,
            gateway_url,
            download_dir,
        } => {
            handlers::handle_serve(config_file, host, port, gateway_url, download_dir).await?;
        }
        Commands::Config {
            init,
            show,
            config_file,
        } => {
            if init {
                handlers::handle_config_init(config_file)?;
            } else if show {
                handlers::handle_config_show(config_file)?;
            } else {
                println!("Config command requires --init or --show");
                println!("Usage: botfetch config --init [--config-file PATH]");
            }
        }
    }

    Ok(())
}
