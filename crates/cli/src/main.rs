mod config;
mod error;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use api::AppState;
use clap::Parser;
use host::{Dispatcher, McpToolServer, ProviderKind, ToolCatalog, ToolServer, provider};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::{Config, ConfigError};
use error::{Error, Result};

#[derive(Parser)]
#[command(name = "toolgate")]
#[command(about = "Approval-gated host between chat clients, tool servers, and an LLM backend")]
#[command(version)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "toolgate.toml")]
    config: PathBuf,

    /// Address to bind the HTTP listener to.
    #[arg(long)]
    bind: Option<IpAddr>,

    /// Port for the HTTP listener.
    #[arg(short, long)]
    port: Option<u16>,

    /// Model backend: "ollama" or "openai".
    #[arg(long)]
    provider: Option<String>,

    /// Model name, overriding the configured one.
    #[arg(long)]
    model: Option<String>,

    /// Backend base URL, overriding the built-in endpoint.
    #[arg(long)]
    base_url: Option<String>,

    /// Credential for hosted backends.
    #[arg(long, env = "TOOLGATE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = if cli.config.exists() {
        info!(path = %cli.config.display(), "loading configuration");
        Config::load(&cli.config)?
    } else {
        info!(path = %cli.config.display(), "no config file, using defaults");
        Config::default()
    };
    apply_overrides(&mut config, &cli)?;

    // Launch every declared tool server before accepting traffic; a
    // server that cannot start is a startup fault, not a degraded mode.
    let mut connections: Vec<Arc<mcp::Connection>> = Vec::new();
    for server_config in config.server_configs() {
        let name = server_config.name.clone();
        match start_server(server_config).await {
            Ok(conn) => connections.push(conn),
            Err(source) => {
                shutdown_all(&connections).await;
                return Err(Error::ServerStartup { name, source });
            }
        }
    }

    let mut catalog = ToolCatalog::new();
    let mut servers: Vec<Arc<dyn ToolServer>> = Vec::new();
    for conn in &connections {
        let server = Arc::new(McpToolServer::new(conn.clone()));
        let registered = match server.descriptors().await {
            Ok(descriptors) => {
                info!(server = %conn.name(), tools = descriptors.len(), "registering tools");
                catalog.register(conn.name(), descriptors)
            }
            Err(e) => Err(e),
        };
        if let Err(e) = registered {
            shutdown_all(&connections).await;
            return Err(e.into());
        }
        servers.push(server);
    }
    if catalog.is_empty() {
        warn!("no tools registered; the model can only answer in text");
    }

    let provider_config = config.provider_config();
    let provider: Arc<dyn host::Provider> = Arc::from(provider::build(&provider_config)?);
    info!(model = %provider.model(), "provider ready");

    let catalog = Arc::new(catalog);
    let tool_timeout = config.tool_timeout();
    let factory: api::SessionFactory = Box::new(move || {
        Dispatcher::new(
            provider.clone(),
            catalog.clone(),
            servers.clone(),
            tool_timeout,
        )
    });
    let state = Arc::new(AppState::new(factory).await);

    let addr = listen_addr(&config, &cli)?;
    tokio::select! {
        result = api::serve(state, addr) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        }
    }

    shutdown_all(&connections).await;
    Ok(())
}

fn apply_overrides(config: &mut Config, cli: &Cli) -> Result<()> {
    if let Some(kind) = &cli.provider {
        config.provider.kind = match kind.to_lowercase().as_str() {
            "ollama" => ProviderKind::Ollama,
            "openai" => ProviderKind::Openai,
            other => {
                return Err(ConfigError::Parse(format!(
                    "unknown provider '{other}', expected 'ollama' or 'openai'"
                ))
                .into());
            }
        };
    }
    if let Some(model) = &cli.model {
        config.provider.model = model.clone();
    }
    if let Some(base_url) = &cli.base_url {
        config.provider.base_url = Some(base_url.clone());
    }
    // Flag, TOOLGATE_API_KEY, LLM_API_KEY, then the file, in that order.
    if let Some(key) = cli
        .api_key
        .clone()
        .or_else(|| std::env::var("LLM_API_KEY").ok())
    {
        config.provider.api_key = Some(key);
    }
    Ok(())
}

fn listen_addr(config: &Config, cli: &Cli) -> Result<SocketAddr> {
    let ip = match cli.bind {
        Some(ip) => ip,
        None => config
            .http
            .bind
            .parse()
            .map_err(|_| ConfigError::Parse(format!("invalid bind address '{}'", config.http.bind)))?,
    };
    Ok(SocketAddr::new(ip, cli.port.unwrap_or(config.http.port)))
}

async fn start_server(server_config: mcp::ServerConfig) -> std::result::Result<Arc<mcp::Connection>, mcp::Error> {
    info!(server = %server_config.name, command = %server_config.command, "starting tool server");
    let conn = Arc::new(mcp::Connection::spawn(server_config).await?);
    conn.initialize().await?;
    Ok(conn)
}

async fn shutdown_all(connections: &[Arc<mcp::Connection>]) {
    for conn in connections {
        conn.shutdown().await;
    }
}
