use crate::config::Config;
use crate::engine::Engine;
use crate::pipeline::Pipeline;
use crate::util::ensure_dir;
use anyhow::{Context, Result};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{Method, StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod download;
pub mod error;
pub mod routes;
pub mod upload;

/// Shared, read-only state handed to every handler.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub engine: Arc<dyn Engine>,
}

impl AppContext {
    pub fn new(config: Config, engine: Arc<dyn Engine>) -> Self {
        Self {
            config: Arc::new(config),
            engine,
        }
    }

    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.config.clone(), self.engine.clone())
    }
}

pub fn create_router(ctx: AppContext) -> Router {
    let body_limit = ctx.config.limits.max_request_bytes();

    let api = Router::new()
        .route("/check-pandoc", get(routes::check_engine))
        .route("/formats", get(routes::list_formats))
        .route("/convert", post(routes::convert))
        .route("/convert-batch", post(routes::convert_batch));

    let mut app = Router::new()
        .route("/health", get(health_check))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http());

    if ctx.config.server.permissive_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE])
            .expose_headers([
                header::CONTENT_DISPOSITION,
                header::HeaderName::from_static(routes::CONVERTED_COUNT_HEADER),
                header::HeaderName::from_static(routes::FAILED_COUNT_HEADER),
            ]);
        app = app.layer(cors);
    }

    app.with_state(ctx)
}

async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// Binds `host:port` and serves until Ctrl-C.
pub async fn start_server(ctx: AppContext) -> Result<()> {
    let cfg = ctx.config.clone();
    ensure_dir(Path::new(&cfg.paths.upload_dir))?;
    ensure_dir(Path::new(&cfg.paths.output_dir))?;

    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port)
        .parse()
        .context("Invalid server address")?;

    let app = create_router(ctx);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
