use std::{net::SocketAddr, path::Path, sync::Arc};

use clap::Parser;
use color_eyre::{Result, eyre::Context};
use edge_forwarder::{
    ForwarderServer, ForwarderService, HttpClientAdapter, HttpHandler, HttpServer,
    config::{
        ConfigOverrides, DEFAULT_CONFIG_TOML, ForwarderConfig, ForwarderConfigValidator, load_config,
    },
    metrics,
    ports::http_client::HttpClient,
    tracing_setup,
    utils::graceful_shutdown::GracefulShutdown,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    /// Configuration file (toml, yaml, json or ini); optional when configured via environment
    #[clap(short, long, global = true)]
    config: Option<String>,

    /// Upstream base URL, overrides `upstream.base_url`
    #[clap(short, long, global = true)]
    upstream: Option<String>,

    /// Listen address, overrides `listen_addr`
    #[clap(short, long, global = true)]
    listen: Option<String>,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration and exit
    Validate,
    /// Write a commented default configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "edge-forwarder.toml")]
        output: String,
    },
    /// Start the forwarder (default)
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let overrides = ConfigOverrides {
        upstream: args.upstream.clone(),
        listen_addr: args.listen.clone(),
    };

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Validate => validate_config_command(args.config.as_deref(), &overrides).await,
        Commands::Init { output } => init_config_command(&output).await,
        Commands::Serve => serve(args.config.as_deref(), &overrides).await,
    }
}

async fn serve(config_path: Option<&str>, overrides: &ConfigOverrides) -> Result<()> {
    let config = load_config(config_path, overrides)
        .await
        .context("Failed to load configuration")?;
    ForwarderConfigValidator::validate(&config).context("Invalid configuration")?;

    tracing_setup::init_tracing(&config.logging).context("Failed to initialize tracing")?;
    metrics::init_metrics().context("Failed to initialize metrics")?;

    let listen_addr: SocketAddr = config
        .listen_addr
        .parse()
        .context("Failed to parse listen address")?;
    let config = Arc::new(config);

    let http_client: Arc<dyn HttpClient> = Arc::new(
        HttpClientAdapter::new(&config.upstream).context("Failed to create HTTP client adapter")?,
    );
    let forwarder = Arc::new(
        ForwarderService::new(config.clone(), http_client)
            .context("Failed to create forwarder")?,
    );
    let powered_by = forwarder.header_policy().powered_by().clone();
    let handler = Arc::new(HttpHandler::new(forwarder.clone()));

    let graceful_shutdown = Arc::new(GracefulShutdown::new());
    let signal_handler_shutdown = graceful_shutdown.clone();
    tokio::spawn(async move {
        signal_handler_shutdown.run_signal_handler().await;
    });

    tracing::info!(
        listen_addr = %listen_addr,
        upstream = %forwarder.upstream(),
        timeout = ?forwarder.timeout(),
        connect_retries = config.upstream.connect_retries,
        "Starting edge forwarder v{}",
        env!("CARGO_PKG_VERSION")
    );

    let server = ForwarderServer::new(listen_addr, handler, powered_by, graceful_shutdown);
    server.run().await
}

/// Validate configuration and exit
async fn validate_config_command(
    config_path: Option<&str>,
    overrides: &ConfigOverrides,
) -> Result<()> {
    match config_path {
        Some(path) => {
            println!("🔍 Validating configuration file: {path}");
            if !Path::new(path).exists() {
                eprintln!("❌ Error: Configuration file '{path}' not found");
                std::process::exit(1);
            }
        }
        None => println!("🔍 Validating configuration from environment"),
    }

    let config: ForwarderConfig = match load_config(config_path, overrides).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:#}");
            std::process::exit(1);
        }
    };

    match ForwarderConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr);
            println!("   • Upstream: {}", config.upstream.base_url);
            println!("   • Timeout: {}", config.upstream.timeout);
            println!("   • Connect Retries: {}", config.upstream.connect_retries);
            println!(
                "   • Extra Headers: {}",
                if config.forwarding.extra_headers.is_empty() {
                    "none".to_string()
                } else {
                    config.forwarding.extra_headers.join(", ")
                }
            );
            println!("   • Answer Preflight: {}", config.cors.answer_preflight);
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Set upstream.base_url (or EDGE_FORWARDER__UPSTREAM__BASE_URL)");
            println!("   • Ensure the upstream URL starts with http:// or https://");
            println!("   • Use humantime durations such as '10s' or '1500ms'");
            println!("   • Verify listen address format (e.g., '0.0.0.0:8080')");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(output: &str) -> Result<()> {
    let path = Path::new(output);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{output}' already exists");
        std::process::exit(1);
    }

    tokio::fs::write(path, DEFAULT_CONFIG_TOML)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {output}");
    println!("   Run 'edge-forwarder serve --config {output}' to start the forwarder");
    Ok(())
}
