use std::{path::PathBuf, sync::Arc, time::Duration};

use {
    anyhow::{Context, Result},
    charla_dispatch::HttpAnswerBackend,
    charla_gateway::{AppState, BroadcastEventSink, CharlaConfig, build_app},
    charla_store::{SessionStore, SqliteSessionStore},
    charla_transport::BridgeTransportFactory,
    clap::Parser,
    sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    tracing::info,
    tracing_subscriber::EnvFilter,
    url::Url,
};

#[derive(Parser)]
#[command(name = "charla", about = "Charla — messaging session gateway")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, env = "CHARLA_CONFIG", default_value = "charla.toml")]
    config: PathBuf,

    /// Address to bind to (overrides config value).
    #[arg(long)]
    bind: Option<String>,
    /// Port to listen on (overrides config value).
    #[arg(long)]
    port: Option<u16>,
    /// Sqlite database path (overrides config value).
    #[arg(long, env = "CHARLA_DB")]
    database: Option<String>,
    /// Transport bridge WebSocket URL (overrides config value).
    #[arg(long, env = "CHARLA_BRIDGE_URL")]
    bridge_url: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
    /// Output logs as JSON instead of human-readable.
    #[arg(long, default_value_t = false)]
    json_logs: bool,
}

fn init_tracing(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone()));
    if cli.json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let mut config = CharlaConfig::load(&cli.config)?;
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(database) = cli.database {
        config.database_path = database;
    }
    if let Some(bridge_url) = cli.bridge_url {
        config.bridge_url = bridge_url;
    }

    let options = SqliteConnectOptions::new()
        .filename(&config.database_path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .connect_with(options)
        .await
        .with_context(|| format!("open session database at {}", config.database_path))?;
    charla_store::run_migrations(&pool).await?;
    let store: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::new(pool));

    let bridge_url =
        Url::parse(&config.bridge_url).context("invalid transport bridge URL")?;
    let events = Arc::new(BroadcastEventSink::new());
    let registry = charla_registry::build(
        Arc::new(BridgeTransportFactory::new(bridge_url)),
        Arc::clone(&store),
        Arc::new(HttpAnswerBackend::new()),
        Arc::clone(&events) as _,
        Duration::from_secs(config.quiet_period_secs),
    );

    let app = build_app(AppState {
        registry,
        store,
        events,
    });

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind to {addr}"))?;
    info!(%addr, bridge = %config.bridge_url, "charla gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}
