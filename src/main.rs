//! harvestd - code execution with artifact harvesting over HTTP.
//!
//! Usage:
//!   harvestd serve [--port 8080]

use clap::{Parser, Subcommand};
use harvestd::backend::HttpBackend;
use harvestd::config::Config;
use harvestd::http_server::{run_server, AppState};
use harvestd::service::ExecService;
use harvestd::store::HttpObjectStore;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "harvestd")]
#[command(about = "Code execution service with artifact harvesting")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8080")]
        port: u16,
    },
}

/// Load configuration: the JSON file named by `HARVESTD_CONFIG` when set,
/// otherwise `HARVESTD_*` environment variables.
fn load_config() -> Config {
    let Ok(path) = std::env::var("HARVESTD_CONFIG") else {
        return Config::from_env();
    };
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("Error reading {}: {}", path, e);
            std::process::exit(1);
        }
    };
    match Config::from_json(&raw) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error parsing {}: {}", path, e);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = load_config();

    match args.command {
        Commands::Serve { port } => {
            let backend = Arc::new(HttpBackend::new(&config.backend_url));
            let store = Arc::new(HttpObjectStore::new(
                &config.storage_url,
                &config.bucket,
                &config.key_prefix,
            ));
            let service = Arc::new(ExecService::new(backend, store, &config));
            let state = AppState { service };
            if let Err(e) = run_server(port, state).await {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}
