// src/utils/notificacion.rs
//
// Notificaciones internas respaldadas en base de datos. El despacho desde el
// flujo de solicitudes es best-effort: un fallo acá se loguea y jamás voltea
// la transición que lo originó.

use chrono::Utc;
use serde_json::{json, Value};
use sqlx::PgPool;

use crate::db::models::notificacion::DestinatarioNotificacion;
use crate::db::models::solicitud::{EstadoSolicitud, Solicitud};
use crate::middleware::auth::permisos;

pub type NotificacionResult<T> = Result<T, NotificacionError>;

#[derive(Debug, thiserror::Error)]
pub enum NotificacionError {
    #[error("Error de base de datos: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Notificación sin destinatarios")]
    SinDestinatarios,
}

/// Builder de notificaciones del sistema.
pub struct NotificacionBuilder {
    titulo: String,
    cuerpo: Option<String>,
    tipo: String,
    datos: Option<Value>,
    destinatarios: Vec<DestinatarioNotificacion>,
    descartable: bool,
    expira_en_dias: Option<i64>,
}

impl NotificacionBuilder {
    pub fn new(titulo: impl Into<String>, tipo: impl Into<String>) -> Self {
        Self {
            titulo: titulo.into(),
            cuerpo: None,
            tipo: tipo.into(),
            datos: None,
            destinatarios: Vec::new(),
            descartable: true,
            expira_en_dias: Some(14),
        }
    }

    pub fn cuerpo(mut self, cuerpo: impl Into<String>) -> Self {
        self.cuerpo = Some(cuerpo.into());
        self
    }

    pub fn datos(mut self, datos: Value) -> Self {
        self.datos = Some(datos);
        self
    }

    pub fn destinatario_usuario(mut self, id_usuario: i32) -> Self {
        self.destinatarios.push(DestinatarioNotificacion::Usuario(id_usuario));
        self
    }

    /// Notifica a todos los usuarios que poseen un código de permiso
    /// (p. ej. el grupo de aprobadores de calidad).
    pub fn destinatario_permiso(mut self, codigo: impl Into<String>) -> Self {
        self.destinatarios.push(DestinatarioNotificacion::Permiso(codigo.into()));
        self
    }

    pub fn expira_en_dias(mut self, dias: Option<i64>) -> Self {
        self.expira_en_dias = dias;
        self
    }

    /// Inserta la notificación y sus destinatarios en una transacción propia.
    pub async fn enviar(self, pool: &PgPool) -> NotificacionResult<i32> {
        if self.destinatarios.is_empty() {
            return Err(NotificacionError::SinDestinatarios);
        }

        let expira_en = self
            .expira_en_dias
            .map(|dias| (Utc::now() + chrono::Duration::days(dias)).naive_utc());

        let mut tx = pool.begin().await?;

        let id_notificacion: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO notificaciones (titulo, cuerpo, tipo, datos, descartable, expira_en)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id_notificacion
            "#,
        )
        .bind(&self.titulo)
        .bind(&self.cuerpo)
        .bind(&self.tipo)
        .bind(&self.datos)
        .bind(self.descartable)
        .bind(expira_en)
        .fetch_one(&mut *tx)
        .await?;

        for destinatario in &self.destinatarios {
            let (alcance, id_usuario, codigo_permiso) = match destinatario {
                DestinatarioNotificacion::Usuario(id) => ("USUARIO", Some(*id), None),
                DestinatarioNotificacion::Permiso(codigo) => ("PERMISO", None, Some(codigo.as_str())),
            };
            sqlx::query(
                r#"
                INSERT INTO notificacion_destinatarios (id_notificacion, alcance, id_usuario, codigo_permiso)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(id_notificacion)
            .bind(alcance)
            .bind(id_usuario)
            .bind(codigo_permiso)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(id_notificacion)
    }
}

/// Tipos de notificación usados por el flujo de solicitudes.
pub mod tipos {
    pub const SOLICITUD_CREADA: &str = "solicitud_creada";
    pub const SOLICITUD_ACEPTADA: &str = "solicitud_aceptada";
    pub const SOLICITUD_DERIVADA: &str = "solicitud_derivada";
    pub const SOLICITUD_RESUELTA: &str = "solicitud_resuelta";
}

fn datos_solicitud(solicitud: &Solicitud) -> Value {
    json!({
        "id_solicitud": solicitud.id_solicitud,
        "tipo_solicitud": solicitud.tipo_solicitud,
        "estado": solicitud.estado,
    })
}

// Cada evento del flujo arma su notificación en una función pura; el wrapper
// `notificar_*` solo la envía. Así los destinatarios quedan bajo test.

fn plan_solicitud_creada(solicitud: &Solicitud) -> NotificacionBuilder {
    let (codigo, etapa) = match solicitud.estado {
        EstadoSolicitud::PendienteCalidad => (permisos::AI_GC_EQUIPOS, "calidad"),
        _ => (permisos::AI_MA_SOLICITUDES, "área técnica"),
    };
    NotificacionBuilder::new(
        format!("Nueva solicitud #{}", solicitud.id_solicitud),
        tipos::SOLICITUD_CREADA,
    )
    .cuerpo(format!("Hay una solicitud nueva pendiente de {etapa}."))
    .datos(datos_solicitud(solicitud))
    .destinatario_permiso(codigo)
}

fn plan_solicitud_aceptada(solicitud: &Solicitud) -> NotificacionBuilder {
    NotificacionBuilder::new(
        format!("Solicitud #{} en revisión técnica", solicitud.id_solicitud),
        tipos::SOLICITUD_ACEPTADA,
    )
    .cuerpo("El área técnica tomó su solicitud para revisión.".to_string())
    .datos(datos_solicitud(solicitud))
    .destinatario_usuario(solicitud.usuario_solicita)
}

fn plan_solicitud_derivada(solicitud: &Solicitud) -> NotificacionBuilder {
    NotificacionBuilder::new(
        format!("Solicitud #{} derivada a calidad", solicitud.id_solicitud),
        tipos::SOLICITUD_DERIVADA,
    )
    .datos(datos_solicitud(solicitud))
    .destinatario_permiso(permisos::AI_GC_EQUIPOS)
    .destinatario_usuario(solicitud.usuario_solicita)
}

fn plan_solicitud_resuelta(solicitud: &Solicitud) -> NotificacionBuilder {
    let veredicto = match solicitud.estado {
        EstadoSolicitud::Aprobado => "aprobada",
        _ => "rechazada",
    };
    NotificacionBuilder::new(
        format!("Solicitud #{} {veredicto}", solicitud.id_solicitud),
        tipos::SOLICITUD_RESUELTA,
    )
    .datos(datos_solicitud(solicitud))
    .destinatario_usuario(solicitud.usuario_solicita)
}

/// Avisa a la etapa que recibe una solicitud recién creada.
pub async fn notificar_solicitud_creada(
    pool: &PgPool,
    solicitud: &Solicitud,
) -> NotificacionResult<i32> {
    plan_solicitud_creada(solicitud).enviar(pool).await
}

/// Avisa al solicitante que su solicitud entró en revisión técnica.
pub async fn notificar_solicitud_aceptada(
    pool: &PgPool,
    solicitud: &Solicitud,
) -> NotificacionResult<i32> {
    plan_solicitud_aceptada(solicitud).enviar(pool).await
}

/// Avisa al grupo de calidad que el área técnica derivó una solicitud.
pub async fn notificar_solicitud_derivada(
    pool: &PgPool,
    solicitud: &Solicitud,
) -> NotificacionResult<i32> {
    plan_solicitud_derivada(solicitud).enviar(pool).await
}

/// Avisa al solicitante que su solicitud quedó en un estado terminal.
pub async fn notificar_solicitud_resuelta(
    pool: &PgPool,
    solicitud: &Solicitud,
) -> NotificacionResult<i32> {
    plan_solicitud_resuelta(solicitud).enviar(pool).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::solicitud::{OrigenSolicitud, TipoSolicitud};
    use chrono::Utc;

    fn solicitud(estado: EstadoSolicitud) -> Solicitud {
        Solicitud {
            id_solicitud: 42,
            tipo_solicitud: TipoSolicitud::Baja,
            origen_solicitud: OrigenSolicitud::Muestreador,
            estado,
            datos_json: json!({}),
            seccion: Some("MA".into()),
            usuario_solicita: 7,
            usuario_tecnica: None,
            usuario_aprueba: None,
            feedback: None,
            feedback_admin: None,
            fecha_solicitud: Utc::now().naive_utc(),
            fecha_tecnica: None,
            fecha_final: None,
        }
    }

    #[test]
    fn creada_notifica_a_la_etapa_que_recibe() {
        let plan = plan_solicitud_creada(&solicitud(EstadoSolicitud::PendienteTecnica));
        assert_eq!(plan.tipo, tipos::SOLICITUD_CREADA);
        assert!(matches!(
            plan.destinatarios.as_slice(),
            [DestinatarioNotificacion::Permiso(p)] if p == permisos::AI_MA_SOLICITUDES
        ));

        let plan = plan_solicitud_creada(&solicitud(EstadoSolicitud::PendienteCalidad));
        assert!(matches!(
            plan.destinatarios.as_slice(),
            [DestinatarioNotificacion::Permiso(p)] if p == permisos::AI_GC_EQUIPOS
        ));
    }

    #[test]
    fn aceptada_notifica_al_solicitante() {
        let plan = plan_solicitud_aceptada(&solicitud(EstadoSolicitud::EnRevisionTecnica));
        assert_eq!(plan.tipo, tipos::SOLICITUD_ACEPTADA);
        assert!(matches!(
            plan.destinatarios.as_slice(),
            [DestinatarioNotificacion::Usuario(7)]
        ));
    }

    #[test]
    fn derivada_notifica_a_calidad_y_al_solicitante() {
        let plan = plan_solicitud_derivada(&solicitud(EstadoSolicitud::PendienteCalidad));
        assert_eq!(plan.destinatarios.len(), 2);
        assert!(plan.destinatarios.iter().any(|d| matches!(
            d,
            DestinatarioNotificacion::Permiso(p) if p == permisos::AI_GC_EQUIPOS
        )));
        assert!(plan
            .destinatarios
            .iter()
            .any(|d| matches!(d, DestinatarioNotificacion::Usuario(7))));
    }

    #[test]
    fn resuelta_notifica_el_veredicto_al_solicitante() {
        let plan = plan_solicitud_resuelta(&solicitud(EstadoSolicitud::Rechazado));
        assert_eq!(plan.tipo, tipos::SOLICITUD_RESUELTA);
        assert!(plan.titulo.contains("rechazada"));
        assert!(matches!(
            plan.destinatarios.as_slice(),
            [DestinatarioNotificacion::Usuario(7)]
        ));
    }
}
