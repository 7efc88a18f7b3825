#![allow(dead_code)]
use axum::middleware::{from_fn, from_fn_with_state};
use axum::{Extension, Router};
use dotenvy::dotenv;
use sqlx::PgPool;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;
use utoipa_swagger_ui::SwaggerUi;

mod api;
mod config;
mod db;
mod middleware;
mod utils;
mod workflow;

use crate::api::auth::AuthDoc;
use crate::config::Config;
use crate::db::pool::get_db_pool;
use crate::db::queries::equipo::EquipoDoc;
use crate::db::queries::ficha::FichaDoc;
use crate::db::queries::notificacion::NotificacionDoc;
use crate::db::queries::solicitud::SolicitudDoc;
use crate::middleware::auth::{create_permission_cache, jwt_middleware, rbac_middleware};

#[tokio::main]
async fn main() {
    dotenv().ok();
    Config::init();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let permission_cache = create_permission_cache();
    let pool = get_db_pool().await;

    let merged_doc = AuthDoc::openapi()
        .merge_from(SolicitudDoc::openapi())
        .merge_from(EquipoDoc::openapi())
        .merge_from(FichaDoc::openapi())
        .merge_from(NotificacionDoc::openapi());

    let public_routes = Router::new().merge(api::auth::auth_routes());

    let private_routes = Router::new()
        .merge(api::solicitud::solicitud_routes())
        .merge(api::equipo::equipo_routes())
        .merge(api::ficha::ficha_routes())
        .merge(api::notificacion::notificacion_routes())
        .merge(api::auth::auth_private_routes())
        .route_layer(from_fn_with_state(pool.clone(), rbac_middleware))
        .route_layer(from_fn(jwt_middleware));

    let app = Router::new()
        .merge(api::health::health_routes())
        .merge(public_routes)
        .merge(private_routes)
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", merged_doc.clone()))
        .merge(RapiDoc::with_openapi("/api-docs/rapidoc.json", merged_doc).path("/rapidoc"))
        .layer(CorsLayer::permissive())
        .layer(Extension(permission_cache.clone()))
        .with_state(pool.clone());

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    run_server(app, shutdown_tx, pool).await;
    info!("Shutdown complete.");
}

async fn shutdown_signal(mut shutdown_rx: broadcast::Receiver<()>, pool: PgPool) {
    tokio::select! {
        _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down..."),
        _ = shutdown_rx.recv() => info!("Received shutdown signal."),
    }
    info!("Closing database pool...");
    pool.close().await;
    info!("Database pool closed. Server shutting down.");
}

async fn run_server(app: Router, shutdown_tx: broadcast::Sender<()>, pool: PgPool) {
    let addr: SocketAddr = Config::get()
        .bind_addr
        .parse()
        .expect("BIND_ADDR must be host:port");
    info!("Server running at http://{addr}");

    let listener = TcpListener::bind(&addr).await.expect("Failed to bind listener");

    let shutdown = shutdown_signal(shutdown_tx.subscribe(), pool.clone());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .expect("Server encountered an error");
}
