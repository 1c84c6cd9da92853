use reserva_api::{app, AppState};
use reserva_core::cache::AtomicCache;
use reserva_core::repository::BookingStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reserva_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = reserva_store::Config::load().expect("Failed to load config");
    tracing::info!("Starting Reserva API on port {}", config.server.port);

    // Redis Connection
    let redis_client = reserva_store::RedisClient::connect(&config.redis.url)
        .await
        .expect("Failed to connect to Redis");
    let cache: Arc<dyn AtomicCache> = Arc::new(redis_client);

    // Postgres Connection + schema
    let db = reserva_store::DbClient::new(&config.database.url)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");
    let store: Arc<dyn BookingStore> =
        Arc::new(reserva_store::PostgresBookingStore::new(db.pool.clone()));

    let app_state = AppState::new(cache, store, config.booking.clone());
    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Shutting down, closing connections");
    db.close().await;
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install shutdown handler: {}", e);
    }
}
