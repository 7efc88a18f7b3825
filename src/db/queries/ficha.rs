// src/db/queries/ficha.rs
//
// Handlers de fichas de ingreso de servicio: el área comercial registra los
// antecedentes del muestreo y la jefatura técnica valida (o rechaza) la
// ficha antes de que el servicio se ejecute.

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use sqlx::{PgPool, Postgres, Transaction};

use crate::api::auth::Claims;
use crate::db::models::ficha::{
    Ficha, FichaCompleta, FichaDetalle, NuevaFicha, NuevoDetalleFicha, ValidacionFicha,
    ValidarFicha,
};
use crate::middleware::auth::UserPermissions;
use crate::utils::api_response::ApiResponse;
use crate::workflow::error::WorkflowError;
use crate::workflow::transition::Capacidad;

const FICHA_COLUMNS: &str = "id_ficha, correlativo, tipo_ficha, cliente, objetivo, \
    punto_muestreo, coordenadas, responsable_muestreo, observaciones_comercial, \
    validacion_tecnica, observaciones_tecnica, usuario_crea, fecha_creacion";

const DETALLE_COLUMNS: &str =
    "id_detalle, id_ficha, item, tecnica, normativa, tipo_analisis, limite_max, laboratorio";

/// Reglas puras de la resolución técnica: PENDIENTE no es un destino y un
/// rechazo exige observaciones.
fn validar_resolucion(payload: &ValidarFicha) -> Result<(), WorkflowError> {
    match payload.resultado {
        ValidacionFicha::Pendiente => Err(WorkflowError::Validation(
            "El resultado debe ser APROBADA o RECHAZADA".into(),
        )),
        ValidacionFicha::Rechazada
            if payload
                .observaciones
                .as_deref()
                .map_or(true, |o| o.trim().is_empty()) =>
        {
            Err(WorkflowError::Validation(
                "El rechazo de una ficha requiere observaciones".into(),
            ))
        }
        _ => Ok(()),
    }
}

async fn detalles_de(pool: &PgPool, id_ficha: i32) -> Result<Vec<FichaDetalle>, WorkflowError> {
    let query = format!(
        "SELECT {DETALLE_COLUMNS} FROM ficha_detalles WHERE id_ficha = $1 ORDER BY item ASC"
    );
    Ok(sqlx::query_as::<_, FichaDetalle>(&query)
        .bind(id_ficha)
        .fetch_all(pool)
        .await?)
}

#[utoipa::path(
    post,
    path = "/fichas",
    request_body = NuevaFicha,
    responses(
        (status = 201, description = "Ficha creada con su detalle de análisis", body = FichaCompleta),
        (status = 400, description = "Encabezado incompleto o ficha sin análisis"),
        (status = 500, description = "Error de persistencia")
    ),
    tag = "Fichas",
    security(("bearerAuth" = []))
)]
pub async fn crear_ficha(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<NuevaFicha>,
) -> Result<ApiResponse<FichaCompleta>, WorkflowError> {
    let usuario_crea = claims.user_id()?;
    payload.validar()?;

    let mut tx: Transaction<'_, Postgres> = pool.begin().await?;

    let query = format!(
        "INSERT INTO fichas \
            (tipo_ficha, cliente, objetivo, punto_muestreo, coordenadas, \
             responsable_muestreo, observaciones_comercial, usuario_crea) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING {FICHA_COLUMNS}"
    );
    let ficha = sqlx::query_as::<_, Ficha>(&query)
        .bind(&payload.tipo_ficha)
        .bind(&payload.cliente)
        .bind(&payload.objetivo)
        .bind(&payload.punto_muestreo)
        .bind(&payload.coordenadas)
        .bind(&payload.responsable_muestreo)
        .bind(&payload.observaciones)
        .bind(usuario_crea)
        .fetch_one(&mut *tx)
        .await?;

    let mut detalles = Vec::with_capacity(payload.detalles.len());
    for (i, detalle) in payload.detalles.iter().enumerate() {
        let query = format!(
            "INSERT INTO ficha_detalles \
                (id_ficha, item, tecnica, normativa, tipo_analisis, limite_max, laboratorio) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {DETALLE_COLUMNS}"
        );
        let fila = sqlx::query_as::<_, FichaDetalle>(&query)
            .bind(ficha.id_ficha)
            .bind((i + 1) as i32)
            .bind(&detalle.tecnica)
            .bind(&detalle.normativa)
            .bind(&detalle.tipo_analisis)
            .bind(detalle.limite_max)
            .bind(&detalle.laboratorio)
            .fetch_one(&mut *tx)
            .await?;
        detalles.push(fila);
    }

    tx.commit().await?;

    Ok(ApiResponse::created("Ficha creada", FichaCompleta { ficha, detalles }))
}

#[utoipa::path(
    get,
    path = "/fichas",
    responses(
        (status = 200, description = "Listado de fichas, más recientes primero", body = Vec<Ficha>),
        (status = 500, description = "Error de persistencia")
    ),
    tag = "Fichas",
    security(("bearerAuth" = []))
)]
pub async fn listar_fichas(
    State(pool): State<PgPool>,
) -> Result<ApiResponse<Vec<Ficha>>, WorkflowError> {
    let query = format!("SELECT {FICHA_COLUMNS} FROM fichas ORDER BY id_ficha DESC");
    let fichas = sqlx::query_as::<_, Ficha>(&query).fetch_all(&pool).await?;
    Ok(ApiResponse::success(axum::http::StatusCode::OK, "Fichas", fichas))
}

#[utoipa::path(
    get,
    path = "/fichas/{id}",
    params(("id" = i32, Path, description = "Id de la ficha")),
    responses(
        (status = 200, description = "Ficha con su detalle de análisis", body = FichaCompleta),
        (status = 404, description = "Ficha no encontrada")
    ),
    tag = "Fichas",
    security(("bearerAuth" = []))
)]
pub async fn obtener_ficha(
    State(pool): State<PgPool>,
    Path(id): Path<i32>,
) -> Result<ApiResponse<FichaCompleta>, WorkflowError> {
    let query = format!("SELECT {FICHA_COLUMNS} FROM fichas WHERE id_ficha = $1");
    let ficha = sqlx::query_as::<_, Ficha>(&query)
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(WorkflowError::NotFound)?;
    let detalles = detalles_de(&pool, id).await?;
    Ok(ApiResponse::success(
        axum::http::StatusCode::OK,
        "Ficha",
        FichaCompleta { ficha, detalles },
    ))
}

#[utoipa::path(
    post,
    path = "/fichas/{id}/validacion",
    params(("id" = i32, Path, description = "Id de la ficha")),
    request_body = ValidarFicha,
    responses(
        (status = 200, description = "Validación técnica registrada", body = Ficha),
        (status = 400, description = "Resultado inválido o rechazo sin observaciones"),
        (status = 403, description = "El actor no es del área técnica"),
        (status = 404, description = "Ficha no encontrada"),
        (status = 409, description = "La ficha ya fue validada")
    ),
    tag = "Fichas",
    security(("bearerAuth" = []))
)]
pub async fn validar_ficha(
    State(pool): State<PgPool>,
    Extension(perms): Extension<UserPermissions>,
    Path(id): Path<i32>,
    Json(payload): Json<ValidarFicha>,
) -> Result<ApiResponse<Ficha>, WorkflowError> {
    let actor = perms.actor();
    if !actor.tiene(Capacidad::Tecnica) {
        return Err(WorkflowError::PermissionDenied(
            "Solo el área técnica valida fichas".into(),
        ));
    }
    validar_resolucion(&payload)?;

    // Compare-and-swap sobre la validación: solo una ficha PENDIENTE admite
    // veredicto, el doble envío choca con el WHERE y termina en 409.
    let query = format!(
        "UPDATE fichas \
         SET validacion_tecnica = $1, observaciones_tecnica = $2 \
         WHERE id_ficha = $3 AND validacion_tecnica = 'PENDIENTE' \
         RETURNING {FICHA_COLUMNS}"
    );
    let actualizada = sqlx::query_as::<_, Ficha>(&query)
        .bind(payload.resultado)
        .bind(&payload.observaciones)
        .bind(id)
        .fetch_optional(&pool)
        .await?;

    match actualizada {
        Some(ficha) => Ok(ApiResponse::success(
            axum::http::StatusCode::OK,
            "Validación técnica registrada",
            ficha,
        )),
        None => {
            let existe: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM fichas WHERE id_ficha = $1)")
                    .bind(id)
                    .fetch_one(&pool)
                    .await?;
            if existe {
                Err(WorkflowError::InvalidTransition)
            } else {
                Err(WorkflowError::NotFound)
            }
        }
    }
}

use utoipa::OpenApi;
#[derive(OpenApi)]
#[openapi(
    paths(crear_ficha, listar_fichas, obtener_ficha, validar_ficha),
    components(schemas(
        Ficha,
        FichaDetalle,
        FichaCompleta,
        NuevaFicha,
        NuevoDetalleFicha,
        ValidarFicha,
        ValidacionFicha
    )),
    tags(
        (name = "Fichas", description = "Fichas de ingreso de servicio y su validación técnica")
    )
)]
pub struct FichaDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolucion_pendiente_es_error() {
        let payload = ValidarFicha { resultado: ValidacionFicha::Pendiente, observaciones: None };
        assert!(matches!(
            validar_resolucion(&payload),
            Err(WorkflowError::Validation(_))
        ));
    }

    #[test]
    fn rechazo_sin_observaciones_es_error() {
        for observaciones in [None, Some("   ".to_string())] {
            let payload = ValidarFicha { resultado: ValidacionFicha::Rechazada, observaciones };
            assert!(matches!(
                validar_resolucion(&payload),
                Err(WorkflowError::Validation(_))
            ));
        }
    }

    #[test]
    fn aprobacion_sin_observaciones_pasa() {
        let payload = ValidarFicha { resultado: ValidacionFicha::Aprobada, observaciones: None };
        assert!(validar_resolucion(&payload).is_ok());
    }

    #[test]
    fn rechazo_con_observaciones_pasa() {
        let payload = ValidarFicha {
            resultado: ValidacionFicha::Rechazada,
            observaciones: Some("Punto de muestreo sin coordenadas verificables".into()),
        };
        assert!(validar_resolucion(&payload).is_ok());
    }
}
