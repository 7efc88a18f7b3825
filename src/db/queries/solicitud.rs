// src/db/queries/solicitud.rs
//
// Handlers del flujo de solicitudes. La legalidad de cada transición la
// decide el núcleo puro (`workflow::transition`); acá solo se persiste el
// resultado con compare-and-swap sobre `estado` y se despachan las
// notificaciones post-commit.

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use tracing::warn;

use crate::api::auth::Claims;
use crate::db::models::solicitud::{
    AccionItem, AccionTecnica, AceptarSolicitud, ActualizarEstado, EstadoSolicitud,
    FiltrosSolicitud, NuevaSolicitud, OrigenSolicitud, RevisionTecnica, Solicitud, TipoSolicitud,
};
use crate::db::queries::equipo::aplicar_efectos_aprobacion;
use crate::middleware::auth::UserPermissions;
use crate::utils::api_response::ApiResponse;
use crate::utils::notificacion::{
    notificar_solicitud_aceptada, notificar_solicitud_creada, notificar_solicitud_derivada,
    notificar_solicitud_resuelta,
};
use crate::workflow::error::WorkflowError;
use crate::workflow::payload::DatosSolicitud;
use crate::workflow::transition::{aplicar_transicion, estado_inicial, Accion, ResultadoTransicion};
use crate::workflow::visibility::alcance_para;

/// Lista de columnas de `solicitudes`, compartida por todas las queries.
const SOLICITUD_COLUMNS: &str = "id_solicitud, tipo_solicitud, origen_solicitud, estado, \
    datos_json, seccion, usuario_solicita, usuario_tecnica, usuario_aprueba, feedback, \
    feedback_admin, fecha_solicitud, fecha_tecnica, fecha_final";

#[utoipa::path(
    post,
    path = "/solicitudes",
    request_body = NuevaSolicitud,
    responses(
        (status = 201, description = "Solicitud creada", body = Solicitud),
        (status = 400, description = "Payload incompleto para el tipo de solicitud"),
        (status = 403, description = "Ruteo directo a calidad sin capacidad técnica"),
        (status = 500, description = "Error de persistencia")
    ),
    tag = "Solicitudes",
    security(("bearerAuth" = []))
)]
pub async fn crear_solicitud(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Extension(perms): Extension<UserPermissions>,
    Json(payload): Json<NuevaSolicitud>,
) -> Result<ApiResponse<Solicitud>, WorkflowError> {
    let usuario_solicita = claims.user_id()?;
    let actor = perms.actor();

    // Valida el payload contra el schema del tipo antes de tocar la base.
    DatosSolicitud::parse(payload.tipo_solicitud, &payload.datos_json)?;

    let origen = payload.origen_solicitud.unwrap_or(OrigenSolicitud::Muestreador);
    let estado = estado_inicial(origen, payload.directo_calidad.unwrap_or(false), &actor)?;

    let query = format!(
        "INSERT INTO solicitudes \
            (tipo_solicitud, origen_solicitud, estado, datos_json, seccion, usuario_solicita) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING {SOLICITUD_COLUMNS}"
    );
    let solicitud = sqlx::query_as::<_, Solicitud>(&query)
        .bind(payload.tipo_solicitud)
        .bind(origen)
        .bind(estado)
        .bind(&payload.datos_json)
        .bind(&payload.seccion)
        .bind(usuario_solicita)
        .fetch_one(&pool)
        .await?;

    if let Err(e) = notificar_solicitud_creada(&pool, &solicitud).await {
        warn!("Notificación de creación falló para #{}: {e}", solicitud.id_solicitud);
    }

    Ok(ApiResponse::created("Solicitud creada", solicitud))
}

#[utoipa::path(
    get,
    path = "/solicitudes",
    params(FiltrosSolicitud),
    responses(
        (status = 200, description = "Solicitudes visibles para el usuario", body = Vec<Solicitud>),
        (status = 500, description = "Error de persistencia")
    ),
    tag = "Solicitudes",
    security(("bearerAuth" = []))
)]
pub async fn listar_solicitudes(
    State(pool): State<PgPool>,
    Extension(perms): Extension<UserPermissions>,
    Query(filtros): Query<FiltrosSolicitud>,
) -> Result<ApiResponse<Vec<Solicitud>>, WorkflowError> {
    let actor = perms.actor();
    let alcance = alcance_para(
        &actor,
        filtros.solo_mias.unwrap_or(false),
        filtros.excluir_mias.unwrap_or(false),
    );

    // Sin permiso de visibilidad el listado es vacío, nunca un error.
    if alcance.vacio {
        return Ok(ApiResponse::success(
            axum::http::StatusCode::OK,
            "Solicitudes",
            Vec::new(),
        ));
    }

    let mut qb = QueryBuilder::<Postgres>::new(format!(
        "SELECT {SOLICITUD_COLUMNS} FROM solicitudes WHERE 1=1"
    ));

    if let Some(estado) = filtros.estado {
        qb.push(" AND estado = ").push_bind(estado);
    }
    if let Some(origen) = filtros.origen_solicitud {
        qb.push(" AND origen_solicitud = ").push_bind(origen);
    }
    if let Some(u) = alcance.usuario_solicita {
        qb.push(" AND usuario_solicita = ").push_bind(u);
    }
    if let Some(u) = alcance.usuario_excluir {
        qb.push(" AND usuario_solicita <> ").push_bind(u);
    }
    if alcance.excluir_pendiente_tecnica {
        qb.push(" AND estado <> ").push_bind(EstadoSolicitud::PendienteTecnica);
    }
    if let Some(secciones) = alcance.secciones.clone() {
        qb.push(" AND (seccion = ANY(").push_bind(secciones).push(")");
        if let Some(u) = alcance.siempre_incluir_usuario {
            qb.push(" OR usuario_solicita = ").push_bind(u);
        }
        qb.push(")");
    }

    qb.push(" ORDER BY fecha_solicitud DESC");

    let solicitudes = qb.build_query_as::<Solicitud>().fetch_all(&pool).await?;
    Ok(ApiResponse::success(axum::http::StatusCode::OK, "Solicitudes", solicitudes))
}

pub async fn obtener_solicitud_por_id(pool: &PgPool, id: i32) -> Result<Solicitud, WorkflowError> {
    let query = format!("SELECT {SOLICITUD_COLUMNS} FROM solicitudes WHERE id_solicitud = $1");
    sqlx::query_as::<_, Solicitud>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(WorkflowError::NotFound)
}

#[utoipa::path(
    get,
    path = "/solicitudes/{id}",
    params(("id" = i32, Path, description = "Id de la solicitud")),
    responses(
        (status = 200, description = "Solicitud", body = Solicitud),
        (status = 404, description = "Solicitud no encontrada")
    ),
    tag = "Solicitudes",
    security(("bearerAuth" = []))
)]
pub async fn obtener_solicitud(
    State(pool): State<PgPool>,
    Path(id): Path<i32>,
) -> Result<ApiResponse<Solicitud>, WorkflowError> {
    let solicitud = obtener_solicitud_por_id(&pool, id).await?;
    Ok(ApiResponse::success(axum::http::StatusCode::OK, "Solicitud", solicitud))
}

/// Persiste una transición con compare-and-swap sobre `estado`. Cero filas
/// afectadas significa que otro actor ya procesó la solicitud: el que pierde
/// la carrera recibe InvalidTransition, no una doble aplicación.
async fn persistir_transicion(
    tx: &mut Transaction<'_, Postgres>,
    id: i32,
    resultado: &ResultadoTransicion,
    datos_override: Option<&Value>,
) -> Result<Solicitud, WorkflowError> {
    let mut qb = QueryBuilder::<Postgres>::new("UPDATE solicitudes SET estado = ");
    qb.push_bind(resultado.hacia);
    if let Some(u) = resultado.usuario_tecnica {
        qb.push(", usuario_tecnica = ").push_bind(u);
    }
    if let Some(u) = resultado.usuario_aprueba {
        qb.push(", usuario_aprueba = ").push_bind(u);
    }
    if let Some(f) = resultado.feedback.clone() {
        qb.push(", feedback = ").push_bind(f);
    }
    if let Some(f) = resultado.feedback_admin.clone() {
        qb.push(", feedback_admin = ").push_bind(f);
    }
    if resultado.marca_fecha_tecnica {
        qb.push(", fecha_tecnica = NOW()");
    }
    if resultado.marca_fecha_final {
        qb.push(", fecha_final = NOW()");
    }
    if let Some(datos) = datos_override.cloned() {
        qb.push(", datos_json = ").push_bind(datos);
    }
    qb.push(" WHERE id_solicitud = ").push_bind(id);
    qb.push(" AND estado = ").push_bind(resultado.desde);
    qb.push(format!(" RETURNING {SOLICITUD_COLUMNS}"));

    match qb.build_query_as::<Solicitud>().fetch_optional(&mut **tx).await? {
        Some(solicitud) => Ok(solicitud),
        None => {
            let existe: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM solicitudes WHERE id_solicitud = $1)")
                    .bind(id)
                    .fetch_one(&mut **tx)
                    .await?;
            if existe {
                Err(WorkflowError::InvalidTransition)
            } else {
                Err(WorkflowError::NotFound)
            }
        }
    }
}

#[utoipa::path(
    post,
    path = "/solicitudes/{id}/aceptar",
    params(("id" = i32, Path, description = "Id de la solicitud")),
    request_body = AceptarSolicitud,
    responses(
        (status = 200, description = "Solicitud tomada para revisión técnica", body = Solicitud),
        (status = 403, description = "El actor no es del área técnica"),
        (status = 404, description = "Solicitud no encontrada"),
        (status = 409, description = "La solicitud no está en PENDIENTE_TECNICA")
    ),
    tag = "Solicitudes",
    security(("bearerAuth" = []))
)]
pub async fn aceptar_solicitud(
    State(pool): State<PgPool>,
    Extension(perms): Extension<UserPermissions>,
    Path(id): Path<i32>,
    Json(payload): Json<AceptarSolicitud>,
) -> Result<ApiResponse<Solicitud>, WorkflowError> {
    let actor = perms.actor();
    let solicitud = obtener_solicitud_por_id(&pool, id).await?;
    let resultado =
        aplicar_transicion(&solicitud, Accion::Aceptar, &actor, payload.feedback.as_deref())?;

    let mut tx = pool.begin().await?;
    let actualizada = persistir_transicion(&mut tx, id, &resultado, None).await?;
    tx.commit().await?;

    if let Err(e) = notificar_solicitud_aceptada(&pool, &actualizada).await {
        warn!("Notificación de aceptación falló para #{id}: {e}");
    }

    Ok(ApiResponse::success(
        axum::http::StatusCode::OK,
        "Solicitud en revisión técnica",
        actualizada,
    ))
}

#[utoipa::path(
    post,
    path = "/solicitudes/{id}/revision",
    params(("id" = i32, Path, description = "Id de la solicitud")),
    request_body = RevisionTecnica,
    responses(
        (status = 200, description = "Revisión técnica aplicada", body = Solicitud),
        (status = 400, description = "Feedback faltante o tipo no concluible por técnica"),
        (status = 403, description = "El actor no es del área técnica"),
        (status = 404, description = "Solicitud no encontrada"),
        (status = 409, description = "La solicitud no admite revisión técnica en su estado actual")
    ),
    tag = "Solicitudes",
    security(("bearerAuth" = []))
)]
pub async fn revision_tecnica(
    State(pool): State<PgPool>,
    Extension(perms): Extension<UserPermissions>,
    Path(id): Path<i32>,
    Json(payload): Json<RevisionTecnica>,
) -> Result<ApiResponse<Solicitud>, WorkflowError> {
    let actor = perms.actor();
    let solicitud = obtener_solicitud_por_id(&pool, id).await?;

    let accion = match payload.accion {
        AccionTecnica::Derivado => Accion::Derivar,
        AccionTecnica::Rechazado => Accion::RechazarTecnica,
        AccionTecnica::Concluido => Accion::Concluir,
    };
    let resultado = aplicar_transicion(&solicitud, accion, &actor, payload.feedback.as_deref())?;

    if let Some(datos) = &payload.datos_json {
        DatosSolicitud::parse(solicitud.tipo_solicitud, datos)?;
    }

    let mut tx = pool.begin().await?;
    let actualizada = persistir_transicion(&mut tx, id, &resultado, payload.datos_json.as_ref()).await?;

    // La conclusión técnica muta los equipos en la misma transacción que el
    // cambio de estado: o se aplican ambos o ninguno.
    if actualizada.estado == EstadoSolicitud::Aprobado {
        aplicar_efectos_aprobacion(&mut tx, &actualizada, actor.id_usuario, None).await?;
    }
    tx.commit().await?;

    let notificado = match actualizada.estado {
        EstadoSolicitud::PendienteCalidad => notificar_solicitud_derivada(&pool, &actualizada).await,
        _ => notificar_solicitud_resuelta(&pool, &actualizada).await,
    };
    if let Err(e) = notificado {
        warn!("Notificación de revisión falló para #{id}: {e}");
    }

    Ok(ApiResponse::success(
        axum::http::StatusCode::OK,
        "Revisión técnica registrada",
        actualizada,
    ))
}

#[utoipa::path(
    put,
    path = "/solicitudes/{id}/status",
    params(("id" = i32, Path, description = "Id de la solicitud")),
    request_body = ActualizarEstado,
    responses(
        (status = 200, description = "Resolución de calidad aplicada", body = Solicitud),
        (status = 400, description = "Estado destino inválido o feedback faltante"),
        (status = 403, description = "El actor no es del área de calidad"),
        (status = 404, description = "Solicitud no encontrada"),
        (status = 409, description = "La solicitud no está en PENDIENTE_CALIDAD")
    ),
    tag = "Solicitudes",
    security(("bearerAuth" = []))
)]
pub async fn actualizar_estado(
    State(pool): State<PgPool>,
    Extension(perms): Extension<UserPermissions>,
    Path(id): Path<i32>,
    Json(payload): Json<ActualizarEstado>,
) -> Result<ApiResponse<Solicitud>, WorkflowError> {
    let actor = perms.actor();

    let accion = match payload.estado {
        EstadoSolicitud::Aprobado => Accion::Aprobar,
        EstadoSolicitud::Rechazado => Accion::Rechazar,
        _ => {
            return Err(WorkflowError::Validation(
                "El estado destino debe ser APROBADO o RECHAZADO".into(),
            ))
        }
    };

    let solicitud = obtener_solicitud_por_id(&pool, id).await?;
    let resultado =
        aplicar_transicion(&solicitud, accion, &actor, payload.feedback_admin.as_deref())?;

    if let Some(datos) = &payload.datos_json {
        DatosSolicitud::parse(solicitud.tipo_solicitud, datos)?;
    }

    let mut tx = pool.begin().await?;
    let actualizada = persistir_transicion(&mut tx, id, &resultado, payload.datos_json.as_ref()).await?;

    // Los efectos sobre equipos van en la misma transacción. Un item marcado
    // RECHAZADO no muta nada aunque la solicitud quede aprobada.
    let procesar_efectos = !matches!(payload.accion_item, Some(AccionItem::Rechazado));
    if actualizada.estado == EstadoSolicitud::Aprobado && procesar_efectos {
        aplicar_efectos_aprobacion(
            &mut tx,
            &actualizada,
            actor.id_usuario,
            payload.id_equipo_procesado,
        )
        .await?;
    }
    tx.commit().await?;

    if let Err(e) = notificar_solicitud_resuelta(&pool, &actualizada).await {
        warn!("Notificación de resolución falló para #{id}: {e}");
    }

    Ok(ApiResponse::success(
        axum::http::StatusCode::OK,
        "Estado de la solicitud actualizado",
        actualizada,
    ))
}

use utoipa::OpenApi;
#[derive(OpenApi)]
#[openapi(
    paths(
        crear_solicitud,
        listar_solicitudes,
        obtener_solicitud,
        aceptar_solicitud,
        revision_tecnica,
        actualizar_estado
    ),
    components(schemas(
        Solicitud,
        NuevaSolicitud,
        AceptarSolicitud,
        RevisionTecnica,
        ActualizarEstado,
        AccionItem,
        AccionTecnica,
        TipoSolicitud,
        OrigenSolicitud,
        EstadoSolicitud
    )),
    tags(
        (name = "Solicitudes", description = "Flujo de aprobación de solicitudes de equipos")
    )
)]
pub struct SolicitudDoc;
