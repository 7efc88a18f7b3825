use axum::{
    routing::{get, patch},
    Router,
};
use sqlx::PgPool;

use crate::db::queries::notificacion::*;

pub fn notificacion_routes() -> Router<PgPool> {
    Router::new()
        .route("/notificaciones", get(listar_mis_notificaciones))
        .route("/notificaciones/{id}/dismiss", patch(descartar_notificacion))
}
