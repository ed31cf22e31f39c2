use anyhow::Context;
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;

use crate::config::{self, Config};
use crate::http::{api::Api, server::HttpServer};
use crate::storage;

#[derive(Parser)]
#[command(name = "trackdeck")]
#[command(version = "0.1")]
#[command(about = "HTTP API for a library of music tracks")]
pub struct Cli {
    /// Path to the config TOML file; defaults are used when omitted
    #[arg(short, long, env = "TRACKDECK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to listen on, overrides http.bind_addr
    #[arg(long, env = "TRACKDECK_BIND_ADDR")]
    pub bind_addr: Option<String>,

    /// Port to listen on, overrides http.port
    #[arg(long, env = "TRACKDECK_PORT")]
    pub port: Option<u16>,

    /// Log filter, overrides log.level (RUST_LOG still wins)
    #[arg(long, env = "TRACKDECK_LOG_LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API until SIGINT or SIGTERM
    Serve,
    /// Print the tracks in the configured store
    List,
}

impl Cli {
    /// Loads the config file and applies command line overrides
    pub fn load_config(&self) -> anyhow::Result<Config> {
        let mut cfg = Config::load(self.config.as_deref())?;

        if let Some(bind_addr) = &self.bind_addr {
            cfg.http.bind_addr = bind_addr.clone();
        }
        if let Some(port) = self.port {
            cfg.http.port = port;
        }
        if let Some(level) = &self.log_level {
            cfg.log.level = level.clone();
        }
        Ok(cfg)
    }
}

fn init_logging(cfg: &config::LogConfig) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cfg.level)).init();
}

/// Entrypoint for CLI
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = cli.load_config()?;
    init_logging(&cfg.log);

    let store = storage::open(&cfg.store).context("Failed to initialize storage")?;

    match &cli.command {
        Commands::Serve => {
            info!("Starting HTTP server with {:?} store", cfg.store);
            HttpServer::new(Api::new(store), cfg.http)
                .run()
                .context("HTTP server failed")?;
        }

        Commands::List => {
            let tracks = store.list().context("Failed to list tracks")?;
            if tracks.is_empty() {
                println!("No tracks stored");
            }
            for track in tracks {
                println!("{:>6}  {}", track.id.0, track.title);
            }
        }
    }
    Ok(())
}
