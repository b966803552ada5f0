mod config;
mod db;
mod dtos;
mod error;
mod handler;
mod middleware;
mod models;
mod routes;
mod service;
mod utils;

use std::sync::Arc;

use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use config::Config;
use db::DBClient;
use dotenv::dotenv;
use routes::create_router;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::filter::LevelFilter;

use service::{
    audit_service::AuditService, dispute_service::DisputeService,
    milestone_service::MilestoneService, order_service::OrderService,
    withdrawal_service::WithdrawalService,
};

#[derive(Debug, Clone)]
pub struct AppState {
    pub env: Config,
    pub db_client: Arc<DBClient>,
    pub order_service: Arc<OrderService>,
    pub dispute_service: Arc<DisputeService>,
    pub milestone_service: Arc<MilestoneService>,
    pub withdrawal_service: Arc<WithdrawalService>,
}

impl AppState {
    pub fn new(db_client: DBClient, config: Config) -> Self {
        let db_client = Arc::new(db_client);

        let audit_service = Arc::new(AuditService::new(db_client.clone()));
        let order_service = Arc::new(OrderService::new(
            db_client.clone(),
            audit_service.clone(),
        ));
        let dispute_service = Arc::new(DisputeService::new(
            db_client.clone(),
            audit_service.clone(),
        ));
        let milestone_service = Arc::new(MilestoneService::new(db_client.clone()));
        let withdrawal_service = Arc::new(WithdrawalService::new(db_client.clone()));

        Self {
            env: config,
            db_client,
            order_service,
            dispute_service,
            milestone_service,
            withdrawal_service,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::DEBUG)
        .init();

    dotenv().ok();

    let config = match Config::init() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("Invalid configuration: {}", err);
            std::process::exit(1);
        }
    };

    let max_connections = config.db_max_connections;
    let pool = match PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(&config.database_url)
        .await
    {
        Ok(pool) => {
            tracing::info!("Connection to the database is successful");
            pool
        }
        Err(err) => {
            tracing::error!("Failed to connect to the database: {:?}", err);
            std::process::exit(1);
        }
    };

    if let Err(err) = sqlx::migrate!("./migrations").run(&pool).await {
        tracing::error!("Failed to run database migrations: {}", err);
        std::process::exit(1);
    }

    let pool_for_monitoring = pool.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
        loop {
            interval.tick().await;
            let size = pool_for_monitoring.size();
            let idle = pool_for_monitoring.num_idle() as u32;
            tracing::debug!(
                "Pool status - active: {}, idle: {}, total: {}",
                size.saturating_sub(idle),
                idle,
                size
            );

            if size >= max_connections * 8 / 10 {
                tracing::warn!("Connection pool at 80% capacity, consider raising DB_MAX_CONNECTIONS");
            }
        }
    });

    let allowed_origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {}", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE])
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
        ]);

    let app_state = Arc::new(AppState::new(DBClient::new(pool), config.clone()));

    let app = create_router(app_state.clone()).layer(cors);

    let app_state_clone = app_state.clone();
    tokio::spawn(async move {
        service::background_jobs::start_auto_completion_job(app_state_clone).await;
    });

    let listener = match tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("Failed to bind port {}: {}", config.port, err);
            std::process::exit(1);
        }
    };

    tracing::info!("Server is running on http://localhost:{}", config.port);

    if let Err(err) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", err);
    }
}
