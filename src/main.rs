use std::{path::Path, sync::Arc};

use clap::Parser;
use color_eyre::{Result, eyre::Context};
use courier::{
    adapters::{GatewayServer, HttpClientAdapter, HttpHandler},
    config::{GatewayConfig, GatewayConfigValidator, loader::load_config_unchecked},
    core::Gateway,
    metrics, tracing_setup,
    utils::ShutdownCoordinator,
};

const DEFAULT_CONFIG_PATH: &str = "conf/config.yaml";

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: String,
    },
    /// Start the gateway server (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config).await,
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Serve { config }) => serve(&config).await,
        None => serve(&args.config).await,
    }
}

async fn serve(config_path: &str) -> Result<()> {
    let config = load_config_unchecked(config_path)
        .await
        .with_context(|| format!("Failed to load configuration from {config_path}"))?;
    GatewayConfigValidator::validate(&config)
        .with_context(|| format!("Invalid configuration in {config_path}"))?;

    // Held for the life of the process so buffered file logs are flushed on exit.
    let _log_guard = tracing_setup::init_tracing(&config.logging)?;
    metrics::init_metrics()?;

    let grace_period = config
        .shutdown
        .grace_period()
        .context("Invalid shutdown grace period")?;

    let http_client = Arc::new(HttpClientAdapter::new().context("Failed to create HTTP client")?);
    let gateway = Arc::new(Gateway::new(&config, http_client));
    let server = GatewayServer::new(Arc::new(HttpHandler::new(gateway)));

    let shutdown = Arc::new(ShutdownCoordinator::with_grace_period(grace_period));
    let signal_handler_shutdown = Arc::clone(&shutdown);
    tokio::spawn(async move {
        if let Err(e) = signal_handler_shutdown.run_signal_handler().await {
            tracing::error!("Signal handler error: {:?}", e);
        }
    });

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind to address {}", config.listen_addr))?;

    tracing::info!(
        listen_addr = %config.listen_addr,
        backend = %config.backend_host,
        routes = config.routes.len(),
        grace_period = ?grace_period,
        "Courier gateway starting"
    );

    if let Err(e) = server.serve(listener, shutdown.shutdown_token()).await {
        tracing::error!(error = %e, "Shutdown did not complete cleanly");
        return Err(e).context("Forced shutdown failed");
    }

    tracing::info!("Graceful shutdown completed");
    Ok(())
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config_unchecked(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e}");
            std::process::exit(1);
        }
    };

    match GatewayConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            print_summary(&config);
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Ensure backend_host starts with http:// or https://");
            println!("   • Ensure every route starts with '/' and has no query string");
            println!("   • Verify listen address format (e.g., '0.0.0.0:80')");
            println!("   • Use humantime durations for the grace period (e.g., '60s', '1m 30s')");
            std::process::exit(1);
        }
    }
}

fn print_summary(config: &GatewayConfig) {
    println!("📋 Configuration Summary:");
    println!("   • Listen Address: {}", config.listen_addr);
    println!("   • Backend: {}", config.backend_host);
    println!("   • Routes: {}", config.routes.len());
    for route in &config.routes {
        println!("       - POST {route}");
    }
    if config.routes.is_empty() {
        println!("   ⚠️  No forwarded routes; every request except GET /ping redirects");
    }
    println!("   • Preserve Query on Redirect: {}", config.redirect.preserve_query);
    println!("   • Shutdown Grace Period: {}", config.shutdown.grace_period);
    println!("   • Max Body Bytes: {}", config.max_body_bytes);
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# Courier gateway configuration

# Address to listen on
listen_addr: "0.0.0.0:80"

# Backend every request is forwarded or redirected to
backend_host: "http://localhost:8000"

# Paths whose POST requests are forwarded; everything else redirects
routes:
  - "/sap/bc/order"
  - "/sap/bc/invoice"

# Largest accepted request body, in bytes
max_body_bytes: 33554432

redirect:
  # Keep the query string on the 301 Location
  preserve_query: false

shutdown:
  # Time in-flight requests get to finish after SIGINT/SIGTERM
  grace_period: "60s"

logging:
  level: "info"
  # pretty | json
  format: "pretty"
  # file:
  #   directory: "logs"
  #   prefix: "courier.log"
  #   rotation: "daily"
"#;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'courier serve --config {config_path}' to start the server");
    Ok(())
}
