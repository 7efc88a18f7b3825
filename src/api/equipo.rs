use axum::{routing::get, Router};
use sqlx::PgPool;

use crate::db::queries::equipo::*;

pub fn equipo_routes() -> Router<PgPool> {
    Router::new()
        .route("/equipos", get(listar_equipos))
        .route("/equipos/{id}", get(obtener_equipo))
        .route("/equipos/{id}/historial", get(historial_equipo))
}
