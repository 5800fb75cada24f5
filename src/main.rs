//! Entry point: load config, wire dependencies, and run the server.

use spark_notify::auth::JwtSecret;
use spark_notify::config::{BusBackend, Config, StoreBackend};
use spark_notify::db::{self, MemoryRecordStore, PgRecordStore, RecordStore};
use spark_notify::error::AppError;
use spark_notify::repositories::{MemoryPubSub, PubSubBackend, RedisRepository};
use spark_notify::services::{ChannelService, Publisher};
use spark_notify::{create_app, AppState};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

async fn connect_redis(url: &str) -> Result<RedisRepository, AppError> {
    let repo = RedisRepository::new(url)?;
    repo.ping().await?;
    Ok(repo)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("config: {}", e))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    // A broken bus must not take the app down: sockets fall back to the
    // local backend and publishes are dropped.
    let (backend, bus_ok): (Arc<dyn PubSubBackend>, bool) = match config.bus_backend {
        BusBackend::Redis => match connect_redis(&config.redis_url).await {
            Ok(repo) => (Arc::new(repo), true),
            Err(e) => {
                tracing::error!(error = %e, "redis unavailable, notifications disabled");
                (Arc::new(MemoryPubSub::new()), false)
            }
        },
        BusBackend::Memory => (Arc::new(MemoryPubSub::new()), true),
    };

    let store: Arc<dyn RecordStore> = match config.store_backend {
        StoreBackend::Postgres => {
            let pool = db::create_pool(&config.database_url).await?;
            Arc::new(PgRecordStore::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("using in-memory record store; data is lost on restart");
            Arc::new(MemoryRecordStore::new())
        }
    };

    let publisher = if bus_ok {
        Publisher::spawn(ChannelService::new(backend.clone()))
    } else {
        Publisher::disabled()
    };

    let state = AppState::new(
        backend,
        store,
        Some(publisher),
        config.app_key.clone(),
        config.app_secret.clone(),
        JwtSecret::new(config.jwt_secret.clone()),
    );

    let app = create_app(state);

    tracing::info!(
        addr = %config.server_addr,
        bus = ?config.bus_backend,
        store = ?config.store_backend,
        "listening"
    );
    let listener = tokio::net::TcpListener::bind(config.server_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
