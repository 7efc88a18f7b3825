// src/db/queries/notificacion.rs
//
// Bandeja de notificaciones del usuario autenticado. Una notificación llega
// por destinatario directo o por poseer el código de permiso al que se
// dirigió; descartar es por usuario, nunca borra la fila original.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Extension;
use sqlx::PgPool;

use crate::api::auth::Claims;
use crate::db::models::notificacion::Notificacion;
use crate::middleware::auth::UserPermissions;
use crate::utils::api_response::ApiResponse;
use crate::workflow::error::WorkflowError;

#[utoipa::path(
    get,
    path = "/notificaciones",
    responses(
        (status = 200, description = "Notificaciones vigentes del usuario", body = Vec<Notificacion>),
        (status = 401, description = "Token inválido")
    ),
    tag = "Notificaciones",
    security(("bearerAuth" = []))
)]
pub async fn listar_mis_notificaciones(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Extension(permisos): Extension<UserPermissions>,
) -> Result<ApiResponse<Vec<Notificacion>>, WorkflowError> {
    let id_usuario = claims.user_id()?;
    let codigos: Vec<String> = permisos.permisos.iter().cloned().collect();

    let notificaciones = sqlx::query_as::<_, Notificacion>(
        r#"
        SELECT DISTINCT n.id_notificacion, n.titulo, n.cuerpo, n.tipo, n.datos,
               n.descartable, n.creado_en, n.expira_en
        FROM notificaciones n
        JOIN notificacion_destinatarios d ON d.id_notificacion = n.id_notificacion
        WHERE ((d.alcance = 'USUARIO' AND d.id_usuario = $1)
            OR (d.alcance = 'PERMISO' AND d.codigo_permiso = ANY($2)))
          AND (n.expira_en IS NULL OR n.expira_en > NOW())
          AND NOT EXISTS (
              SELECT 1 FROM notificacion_descartes x
              WHERE x.id_notificacion = n.id_notificacion AND x.id_usuario = $1
          )
        ORDER BY n.creado_en DESC
        "#,
    )
    .bind(id_usuario)
    .bind(&codigos)
    .fetch_all(&pool)
    .await?;

    Ok(ApiResponse::success(StatusCode::OK, "Notificaciones", notificaciones))
}

#[utoipa::path(
    patch,
    path = "/notificaciones/{id}/dismiss",
    params(("id" = i32, Path, description = "Id de la notificación")),
    responses(
        (status = 200, description = "Notificación descartada"),
        (status = 404, description = "Notificación inexistente o no descartable")
    ),
    tag = "Notificaciones",
    security(("bearerAuth" = []))
)]
pub async fn descartar_notificacion(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i32>,
) -> Result<ApiResponse<()>, WorkflowError> {
    let id_usuario = claims.user_id()?;

    let descartable: Option<bool> =
        sqlx::query_scalar("SELECT descartable FROM notificaciones WHERE id_notificacion = $1")
            .bind(id)
            .fetch_optional(&pool)
            .await?;

    match descartable {
        None | Some(false) => Err(WorkflowError::NotFound),
        Some(true) => {
            sqlx::query(
                "INSERT INTO notificacion_descartes (id_notificacion, id_usuario) \
                 VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(id)
            .bind(id_usuario)
            .execute(&pool)
            .await?;
            Ok(ApiResponse::success(StatusCode::OK, "Notificación descartada", ()))
        }
    }
}

use utoipa::OpenApi;
#[derive(OpenApi)]
#[openapi(
    paths(listar_mis_notificaciones, descartar_notificacion),
    components(schemas(Notificacion)),
    tags(
        (name = "Notificaciones", description = "Bandeja de notificaciones por usuario o permiso")
    )
)]
pub struct NotificacionDoc;
