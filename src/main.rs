use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use wechat_mcp::auth::{TokenManager, WechatTokenAuthority};
use wechat_mcp::config::{load_config, ServerMode, WechatMcpConfig};
use wechat_mcp::credentials::{ConfigStore, Credential};
use wechat_mcp::mcp::{self, McpServer};
use wechat_mcp::tools::{get_all_tools, ToolContext, ToolRegistry};
use wechat_mcp::wechat::WechatClient;

#[derive(Parser)]
#[command(
    name = "wechat-mcp",
    version,
    about = "MCP server for the WeChat Official Account API"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the MCP server
    Mcp(McpArgs),
    /// Print the version
    Version,
}

#[derive(clap::Args)]
struct McpArgs {
    /// Official Account AppID
    #[arg(short = 'a', long, env = "WECHAT_APP_ID")]
    app_id: Option<String>,

    /// Official Account AppSecret
    #[arg(short = 's', long, env = "WECHAT_APP_SECRET", hide_env_values = true)]
    app_secret: Option<String>,

    /// Transport
    #[arg(short = 'm', long, env = "WECHAT_MCP_MODE", value_enum)]
    mode: Option<ServerMode>,

    /// SSE listen port
    #[arg(short = 'p', long, env = "WECHAT_MCP_PORT")]
    port: Option<u16>,

    /// SSE listen address
    #[arg(long)]
    host: Option<String>,

    /// TOML configuration file
    #[arg(long, env = "WECHAT_MCP_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database path
    #[arg(long, env = "WECHAT_MCP_DB")]
    db: Option<PathBuf>,

    /// Comma-separated tool names to expose (default: all)
    #[arg(long, value_delimiter = ',')]
    tools: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout is reserved for protocol traffic in stdio mode
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wechat_mcp=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Version => {
            println!("wechat-mcp {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Mcp(args) => run_mcp(args).await,
    }
}

async fn run_mcp(args: McpArgs) -> Result<()> {
    info!("wechat-mcp starting...");

    let mut config = load_config(args.config.as_deref())?;
    apply_args(&mut config, &args);

    info!(
        mode = %config.server.mode,
        database_path = %config.storage.database_path,
        api_base_url = %config.api.base_url,
        refresh_skew_seconds = config.auth.refresh_skew_seconds,
        encrypted = config.storage.encryption_key.is_some(),
        "Configuration loaded"
    );

    let db_path = PathBuf::from(&config.storage.database_path);
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
    }

    let store = Arc::new(
        ConfigStore::new(&db_path, config.storage.encryption_key.as_deref())
            .context("Failed to initialize config store")?,
    );
    info!("Config store initialized");

    let timeout = Duration::from_secs(config.api.timeout_seconds);
    let authority = Arc::new(
        WechatTokenAuthority::new(&config.api.base_url, timeout)
            .context("Failed to initialize token authority")?,
    );
    let tokens = TokenManager::new(
        store.clone(),
        authority,
        chrono::Duration::seconds(config.auth.refresh_skew_seconds),
    );
    tokens
        .initialize()
        .context("Failed to load stored credential")?;

    apply_credential(&tokens, args.app_id, args.app_secret)?;

    let client = WechatClient::new(tokens, &config.api.base_url, timeout)?;
    let ctx = ToolContext::new(client, store);
    let registry = Arc::new(ToolRegistry::new(get_all_tools(), &config.tools.enabled));
    let server = McpServer::new(registry, ctx);

    match config.server.mode {
        ServerMode::Stdio => mcp::stdio::run(server).await,
        ServerMode::Sse => {
            mcp::sse::run(
                server,
                &config.server.host,
                config.server.port,
                &config.server.cors_origin,
            )
            .await
        }
    }
}

/// Command-line flags win over the config file and environment.
fn apply_args(config: &mut WechatMcpConfig, args: &McpArgs) {
    if let Some(mode) = args.mode {
        config.server.mode = mode;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(db) = &args.db {
        config.storage.database_path = db.display().to_string();
    }
    if !args.tools.is_empty() {
        config.tools.enabled = args.tools.clone();
    }
}

/// Stores a credential passed on the command line unless the same one is already stored,
/// so a persisted token survives restarts.
fn apply_credential(
    tokens: &TokenManager,
    app_id: Option<String>,
    app_secret: Option<String>,
) -> Result<()> {
    let (app_id, app_secret) = match (app_id, app_secret) {
        (Some(app_id), Some(app_secret)) => (app_id, app_secret),
        (None, None) => {
            if tokens.is_configured() {
                info!("Using stored WeChat credential");
            } else {
                warn!("No WeChat credential configured; run the wechat_auth tool with action \"configure\"");
            }
            return Ok(());
        }
        _ => bail!("--app-id and --app-secret must be given together"),
    };

    let current = tokens
        .get_credential()
        .context("Failed to read stored credential")?;
    if let Some(current) = current {
        if current.app_id == app_id && current.app_secret == app_secret {
            info!(app_id = %app_id, "Stored credential matches, keeping cached token");
            return Ok(());
        }
    }

    tokens
        .set_credential(Credential::new(app_id.clone(), app_secret))
        .context("Failed to store credential")?;
    info!(app_id = %app_id, "Credential configured");
    Ok(())
}
