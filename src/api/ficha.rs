use axum::{
    routing::{get, post},
    Router,
};
use sqlx::PgPool;

use crate::db::queries::ficha::*;

pub fn ficha_routes() -> Router<PgPool> {
    Router::new()
        .route("/fichas", post(crear_ficha).get(listar_fichas))
        .route("/fichas/{id}", get(obtener_ficha))
        .route("/fichas/{id}/validacion", post(validar_ficha))
}
