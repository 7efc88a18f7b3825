// src/db/queries/equipo.rs
//
// Consultas de equipos y las mutaciones que una solicitud aprobada produce.
// Toda mutación inserta primero una instantánea en `equipos_historial` y
// recién entonces actualiza la fila, subiendo `version`.

use axum::extract::{Path, Query, State};
use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};

use crate::db::models::equipo::{Equipo, EquipoHistorial, FiltrosEquipo};
use crate::db::models::solicitud::Solicitud;
use crate::utils::api_response::ApiResponse;
use crate::workflow::error::WorkflowError;
use crate::workflow::payload::DatosSolicitud;

const EQUIPO_COLUMNS: &str = "id_equipo, codigo, nombre, tipo, ubicacion, responsable, \
    id_muestreador, fecha_vigencia, habilitado, version, fecha_creacion, fecha_actualizacion";

const HISTORIAL_COLUMNS: &str = "id_historial, id_equipo, codigo, nombre, tipo, ubicacion, \
    responsable, id_muestreador, fecha_vigencia, habilitado, version, usuario_cambio, fecha_cambio";

#[utoipa::path(
    get,
    path = "/equipos",
    params(FiltrosEquipo),
    responses(
        (status = 200, description = "Listado de equipos", body = Vec<Equipo>),
        (status = 500, description = "Error de persistencia")
    ),
    tag = "Equipos",
    security(("bearerAuth" = []))
)]
pub async fn listar_equipos(
    State(pool): State<PgPool>,
    Query(filtros): Query<FiltrosEquipo>,
) -> Result<ApiResponse<Vec<Equipo>>, WorkflowError> {
    let mut qb =
        QueryBuilder::<Postgres>::new(format!("SELECT {EQUIPO_COLUMNS} FROM equipos WHERE 1=1"));

    if let Some(search) = filtros.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let patron = format!("%{}%", search.trim());
        qb.push(" AND (codigo ILIKE ").push_bind(patron.clone());
        qb.push(" OR nombre ILIKE ").push_bind(patron);
        qb.push(")");
    }
    if let Some(tipo) = filtros.tipo.clone().filter(|t| t != "Todos") {
        qb.push(" AND tipo = ").push_bind(tipo);
    }
    match filtros.estado.as_deref() {
        Some("Activo") => {
            qb.push(" AND habilitado = TRUE");
        }
        Some("Inactivo") => {
            qb.push(" AND habilitado = FALSE");
        }
        _ => {}
    }

    let limit = filtros.limit.unwrap_or(10).clamp(1, 100);
    let offset = (filtros.page.unwrap_or(1).max(1) - 1) * limit;
    qb.push(" ORDER BY codigo ASC LIMIT ").push_bind(limit);
    qb.push(" OFFSET ").push_bind(offset);

    let equipos = qb.build_query_as::<Equipo>().fetch_all(&pool).await?;
    Ok(ApiResponse::success(axum::http::StatusCode::OK, "Equipos", equipos))
}

#[utoipa::path(
    get,
    path = "/equipos/{id}",
    params(("id" = i32, Path, description = "Id del equipo")),
    responses(
        (status = 200, description = "Equipo", body = Equipo),
        (status = 404, description = "Equipo no encontrado")
    ),
    tag = "Equipos",
    security(("bearerAuth" = []))
)]
pub async fn obtener_equipo(
    State(pool): State<PgPool>,
    Path(id): Path<i32>,
) -> Result<ApiResponse<Equipo>, WorkflowError> {
    let query = format!("SELECT {EQUIPO_COLUMNS} FROM equipos WHERE id_equipo = $1");
    let equipo = sqlx::query_as::<_, Equipo>(&query)
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(WorkflowError::NotFound)?;
    Ok(ApiResponse::success(axum::http::StatusCode::OK, "Equipo", equipo))
}

#[utoipa::path(
    get,
    path = "/equipos/{id}/historial",
    params(("id" = i32, Path, description = "Id del equipo")),
    responses(
        (status = 200, description = "Historial de versiones del equipo", body = Vec<EquipoHistorial>),
        (status = 404, description = "Equipo no encontrado")
    ),
    tag = "Equipos",
    security(("bearerAuth" = []))
)]
pub async fn historial_equipo(
    State(pool): State<PgPool>,
    Path(id): Path<i32>,
) -> Result<ApiResponse<Vec<EquipoHistorial>>, WorkflowError> {
    let existe: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM equipos WHERE id_equipo = $1)")
        .bind(id)
        .fetch_one(&pool)
        .await?;
    if !existe {
        return Err(WorkflowError::NotFound);
    }

    let query = format!(
        "SELECT {HISTORIAL_COLUMNS} FROM equipos_historial \
         WHERE id_equipo = $1 ORDER BY version DESC"
    );
    let historial = sqlx::query_as::<_, EquipoHistorial>(&query)
        .bind(id)
        .fetch_all(&pool)
        .await?;
    Ok(ApiResponse::success(axum::http::StatusCode::OK, "Historial del equipo", historial))
}

/// Copia la fila actual del equipo al historial antes de mutarla.
async fn registrar_historial(
    tx: &mut Transaction<'_, Postgres>,
    id_equipo: i32,
    usuario_cambio: i32,
) -> Result<(), WorkflowError> {
    let resultado = sqlx::query(
        r#"
        INSERT INTO equipos_historial
            (id_equipo, codigo, nombre, tipo, ubicacion, responsable, id_muestreador,
             fecha_vigencia, habilitado, version, usuario_cambio)
        SELECT id_equipo, codigo, nombre, tipo, ubicacion, responsable, id_muestreador,
               fecha_vigencia, habilitado, version, $2
        FROM equipos WHERE id_equipo = $1
        "#,
    )
    .bind(id_equipo)
    .bind(usuario_cambio)
    .execute(&mut **tx)
    .await?;

    if resultado.rows_affected() == 0 {
        return Err(WorkflowError::NotFound);
    }
    Ok(())
}

async fn actualizar_equipo(
    tx: &mut Transaction<'_, Postgres>,
    id_equipo: i32,
    usuario_cambio: i32,
    set_clause: &str,
    vigencia: Option<NaiveDate>,
    ubicacion: Option<&str>,
    responsable: Option<&str>,
) -> Result<(), WorkflowError> {
    registrar_historial(tx, id_equipo, usuario_cambio).await?;

    let query = format!(
        "UPDATE equipos SET {set_clause}, version = version + 1, \
         fecha_actualizacion = NOW() WHERE id_equipo = $1"
    );
    let mut q = sqlx::query(&query).bind(id_equipo);
    if let Some(v) = vigencia {
        q = q.bind(v);
    }
    if let Some(u) = ubicacion {
        q = q.bind(u);
    }
    if let Some(r) = responsable {
        q = q.bind(r);
    }
    q.execute(&mut **tx).await?;
    Ok(())
}

async fn crear_equipo_aprobado(
    tx: &mut Transaction<'_, Postgres>,
    datos: &crate::workflow::payload::DatosNuevoEquipo,
) -> Result<(), WorkflowError> {
    sqlx::query(
        r#"
        INSERT INTO equipos
            (codigo, nombre, tipo, ubicacion, responsable, id_muestreador,
             fecha_vigencia, habilitado, version)
        VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE, 1)
        "#,
    )
    .bind(&datos.codigo)
    .bind(&datos.nombre)
    .bind(&datos.tipo)
    .bind(&datos.ubicacion)
    .bind(&datos.responsable)
    .bind(datos.id_muestreador)
    .bind(datos.vigencia)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Restringe los items de una solicitud con lista al equipo pedido. Un id
/// que no pertenece a la solicitud es un error del llamador, no un no-op.
fn seleccionar_items<T>(
    items: Vec<T>,
    solo_equipo: Option<i32>,
    id_de: impl Fn(&T) -> i32,
) -> Result<Vec<T>, WorkflowError> {
    let Some(id) = solo_equipo else {
        return Ok(items);
    };
    let filtrados: Vec<T> = items.into_iter().filter(|item| id_de(item) == id).collect();
    if filtrados.is_empty() {
        return Err(WorkflowError::Validation(format!(
            "El equipo {id} no pertenece a esta solicitud"
        )));
    }
    Ok(filtrados)
}

/// Lo mismo para las solicitudes de equipo único.
fn verificar_equipo_unico(id_equipo: i32, solo_equipo: Option<i32>) -> Result<(), WorkflowError> {
    match solo_equipo {
        Some(id) if id != id_equipo => Err(WorkflowError::Validation(format!(
            "El equipo {id} no pertenece a esta solicitud"
        ))),
        _ => Ok(()),
    }
}

/// Aplica sobre los equipos el efecto de una solicitud aprobada, dentro de la
/// misma transacción que el cambio de estado. `solo_equipo` restringe el
/// procesamiento a un item puntual de las solicitudes con lista.
pub async fn aplicar_efectos_aprobacion(
    tx: &mut Transaction<'_, Postgres>,
    solicitud: &Solicitud,
    usuario: i32,
    solo_equipo: Option<i32>,
) -> Result<(), WorkflowError> {
    let datos = DatosSolicitud::parse(solicitud.tipo_solicitud, &solicitud.datos_json)?;

    match datos {
        DatosSolicitud::NuevoEquipo(d) => crear_equipo_aprobado(tx, &d).await,
        DatosSolicitud::Alta(d) => {
            let items = seleccionar_items(d.equipos_alta, solo_equipo, |item| item.id_equipo)?;
            for item in items {
                actualizar_equipo(
                    tx,
                    item.id_equipo,
                    usuario,
                    "habilitado = TRUE, fecha_vigencia = $2",
                    Some(item.vigencia),
                    None,
                    None,
                )
                .await?;
            }
            Ok(())
        }
        DatosSolicitud::Traspaso(d) => {
            verificar_equipo_unico(d.id_equipo, solo_equipo)?;
            actualizar_equipo(
                tx,
                d.id_equipo,
                usuario,
                "ubicacion = $2, responsable = $3",
                None,
                Some(&d.nueva_ubicacion),
                Some(&d.nuevo_responsable),
            )
            .await
        }
        DatosSolicitud::Baja(d) => {
            let ids = seleccionar_items(d.equipos_baja, solo_equipo, |id| *id)?;
            for id_equipo in ids {
                actualizar_equipo(tx, id_equipo, usuario, "habilitado = FALSE", None, None, None)
                    .await?;
            }
            Ok(())
        }
        DatosSolicitud::VigenciaProxima(d) => {
            verificar_equipo_unico(d.id_equipo, solo_equipo)?;
            actualizar_equipo(
                tx,
                d.id_equipo,
                usuario,
                "fecha_vigencia = $2",
                Some(d.nueva_vigencia_solicitada),
                None,
                None,
            )
            .await
        }
        DatosSolicitud::EquipoDeshabilitado(d) => {
            verificar_equipo_unico(d.id_equipo, solo_equipo)?;
            actualizar_equipo(
                tx,
                d.id_equipo,
                usuario,
                "habilitado = FALSE, fecha_vigencia = $2",
                Some(d.vigencia),
                None,
                None,
            )
            .await
        }
        DatosSolicitud::EquipoPerdido(d) => {
            // Un equipo perdido aprobado queda fuera del inventario activo.
            verificar_equipo_unico(d.id_equipo, solo_equipo)?;
            actualizar_equipo(tx, d.id_equipo, usuario, "habilitado = FALSE", None, None, None)
                .await
        }
        // Revisiones y reportes de problema no mutan el equipo.
        DatosSolicitud::Revision(_) | DatosSolicitud::ReporteProblema(_) => Ok(()),
    }
}

use utoipa::OpenApi;
#[derive(OpenApi)]
#[openapi(
    paths(listar_equipos, obtener_equipo, historial_equipo),
    components(schemas(Equipo, EquipoHistorial)),
    tags(
        (name = "Equipos", description = "Inventario de equipos y su historial de versiones")
    )
)]
pub struct EquipoDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sin_filtro_se_procesan_todos_los_items() {
        let ids = seleccionar_items(vec![3, 4, 5], None, |id| *id).unwrap();
        assert_eq!(ids, vec![3, 4, 5]);
    }

    #[test]
    fn el_filtro_acota_a_un_item() {
        let ids = seleccionar_items(vec![3, 4, 5], Some(4), |id| *id).unwrap();
        assert_eq!(ids, vec![4]);
    }

    #[test]
    fn filtro_sin_coincidencia_es_error_de_validacion() {
        let err = seleccionar_items(vec![3, 4, 5], Some(99), |id| *id).unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }

    #[test]
    fn equipo_unico_rechaza_un_filtro_ajeno() {
        assert!(verificar_equipo_unico(3, None).is_ok());
        assert!(verificar_equipo_unico(3, Some(3)).is_ok());
        let err = verificar_equipo_unico(3, Some(99)).unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }
}
