use clap::Parser;
use eap_server::{Config, EapServer, Negotiator};
use std::process;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// EAP over RADIUS authentication server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "eap-radius")]
struct Cli {
    /// Path to configuration file
    #[arg(value_name = "CONFIG", default_value = "config.json")]
    config_path: String,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::from_file(&cli.config_path) {
        Ok(config) => config,
        Err(e) => {
            init_tracing("info");

            if cli.validate {
                error!("Configuration validation failed: {}", e);
                process::exit(1);
            }

            warn!("Could not load config file from: {}", cli.config_path);
            info!("Creating example configuration at: {}", cli.config_path);
            if let Err(e) = Config::example().to_file(&cli.config_path) {
                error!("Error creating example config: {}", e);
                process::exit(1);
            }
            info!("Please edit {} and restart the server", cli.config_path);
            process::exit(0);
        }
    };

    init_tracing(config.log_level.as_deref().unwrap_or("info"));

    if cli.validate {
        // builds the TLS configuration too, so certificate problems show up here
        match Negotiator::from_config(&config) {
            Ok(negotiator) => {
                info!("Configuration is valid");
                info!("  Listen: {}:{}", config.listen_address, config.listen_port);
                info!("  Clients: {}", config.clients.len());
                info!("  Users: {}", config.users.len());
                info!("  Methods: {:?}", config.eap.methods);
                info!("  PEAP inner methods: {:?}", config.eap.peap_inner_methods);
                info!("  TLS: {}", negotiator.tls_config().is_some());
                process::exit(0);
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                process::exit(1);
            }
        }
    }

    info!("eap-radius v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded configuration from: {}", cli.config_path);
    if config.clients.is_empty() {
        warn!("No clients configured, requests from any address are accepted");
    }
    if config.eap.tls.is_none() {
        warn!("No server certificate configured, EAP-TLS and PEAP are not offered");
    }

    let server = match EapServer::from_config(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to create server: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = server.run().await {
        error!("Server error: {}", e);
        process::exit(1);
    }
}
