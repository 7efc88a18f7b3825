use axum::{
    routing::{get, post, put},
    Router,
};
use sqlx::PgPool;

use crate::db::queries::solicitud::*;

pub fn solicitud_routes() -> Router<PgPool> {
    Router::new()
        .route("/solicitudes", post(crear_solicitud))
        .route("/solicitudes", get(listar_solicitudes))
        .route("/solicitudes/{id}", get(obtener_solicitud))
        .route("/solicitudes/{id}/aceptar", post(aceptar_solicitud))
        .route("/solicitudes/{id}/revision", post(revision_tecnica))
        .route("/solicitudes/{id}/status", put(actualizar_estado))
}
