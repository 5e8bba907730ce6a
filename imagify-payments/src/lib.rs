pub mod config;
pub mod dtos;
pub mod handlers;
pub mod models;
pub mod services;

use axum::middleware::from_fn;
use axum::{
    routing::{get, post},
    Router,
};
use imagify_core::middleware::auth::AuthConfig;
use imagify_core::middleware::security_headers::security_headers_middleware;
use imagify_core::middleware::tracing::request_id_middleware;
use mongodb::{options::ClientOptions, Client};
use secrecy::ExposeSecret;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use config::Config;
use services::{PaymentRepository, VnpayClient};

#[derive(Clone)]
pub struct AppState {
    pub db: mongodb::Database,
    pub config: Config,
    pub repository: PaymentRepository,
    pub vnpay: VnpayClient,
}

impl AsRef<AuthConfig> for AppState {
    fn as_ref(&self) -> &AuthConfig {
        &self.config.auth
    }
}

pub struct Application {
    host: String,
    port: u16,
    router: Router,
}

impl Application {
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let mut client_options = ClientOptions::parse(config.database.url.expose_secret()).await?;
        client_options.app_name = Some(config.service_name.clone());

        let client = Client::with_options(client_options)?;
        let db = client.database(&config.database.db_name);

        let repository = PaymentRepository::new(&db);

        // Initialize indexes for user-scoped queries
        repository.init_indexes().await?;

        let vnpay = VnpayClient::new(config.vnpay.clone());
        if vnpay.is_configured() {
            tracing::info!("VNPay client initialized");
        } else {
            tracing::warn!("VNPay credentials not configured - payments will be rejected");
        }

        let state = AppState {
            db,
            config: config.clone(),
            repository,
            vnpay,
        };

        let router = Router::new()
            .route("/health", get(handlers::health_check))
            .route("/ready", get(handlers::readiness_check))
            .route("/metrics", get(handlers::metrics))
            // Payment endpoints
            .route("/payments/vnpay", post(handlers::payments::create_payment))
            .route(
                "/payments/vnpay/return",
                get(handlers::payments::vnpay_return),
            )
            // Transaction endpoints (user-scoped)
            .route(
                "/transactions",
                get(handlers::transactions::list_transactions),
            )
            .route(
                "/transactions/:id",
                get(handlers::transactions::get_transaction),
            )
            .layer(from_fn(security_headers_middleware))
            .layer(from_fn(request_id_middleware))
            .layer(CorsLayer::permissive())
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-");

                    tracing::info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                        user_id = tracing::field::Empty,
                    )
                }),
            )
            .with_state(state);

        Ok(Self {
            host: config.server.host,
            port: config.server.port,
            router,
        })
    }

    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        tracing::info!("Listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, self.router).await?;

        Ok(())
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}
