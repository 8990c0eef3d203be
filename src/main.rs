use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use dappled::{
    api::{AppState, router},
    config::{Config, Secrets},
    db,
    generation::{Pipeline, backend::ChatBackend, search::TavilySearch},
    utils::init_log,
};
use rustls::crypto::{CryptoProvider, ring};
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tower_sessions::{ExpiredDeletion, Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::SqliteStore;
use tracing::{Level, info};

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "dappled.toml")]
    config: PathBuf,
    /// Database url, overrides the config file
    #[arg(short, long)]
    database: Option<String>,
    #[arg(short = 'H', long)]
    host: Option<String>,
    #[arg(short, long)]
    port: Option<u16>,
    /// Directory for daily rotated log files; stdout when unset
    #[arg(short, long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let mut config = Config::load(&args.config)?;
    if let Some(database) = args.database {
        config.database = database;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.log_dir.is_some() {
        config.log_dir = args.log_dir;
    }
    let _guard = init_log(config.log_dir.clone())?;
    let secrets = Secrets::from_env()?;

    let database = db::connect(&config.database).await?;
    info!("database ready at {}", config.database);

    let session_store = SqliteStore::new(database.clone());
    session_store.migrate().await?;
    tokio::spawn(
        session_store
            .clone()
            .continuously_delete_expired(tokio::time::Duration::from_secs(60)),
    );
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(config.server.tls_cert.is_some())
        .with_expiry(Expiry::OnInactivity(time::Duration::days(5)));

    let search = TavilySearch::new(&config.search, secrets.search_api_key)?;
    let backends = ChatBackend::from_config(&config.generation, &secrets.generation_api_key);
    info!("generation candidates: {:?}", config.generation.models);
    let state = AppState {
        database,
        pipeline: Arc::new(Pipeline::new(
            search,
            backends,
            config.generation.quiz_content_limit,
        )),
        webhook_secret: Arc::from(secrets.webhook_secret),
    };

    let app = router(state).layer(session_layer).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    match (&config.server.tls_cert, &config.server.tls_key) {
        (Some(cert), Some(key)) => {
            CryptoProvider::install_default(ring::default_provider()).map_err(|e| {
                anyhow::anyhow!("Failed to initialize rustls crypto provider: {:?}", e)
            })?;
            let tls = RustlsConfig::from_pem_file(cert, key).await?;
            info!("Starting server at https://{addr}");
            axum_server::bind_rustls(addr, tls)
                .serve(app.into_make_service())
                .await?;
        }
        _ => {
            let listener = TcpListener::bind(addr).await?;
            info!("Starting server at http://{addr}");
            axum::serve(listener, app).await?;
        }
    }
    Ok(())
}
