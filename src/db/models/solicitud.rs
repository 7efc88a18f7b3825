// src/db/models/solicitud.rs
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};

/// Tipos de solicitud soportados por el flujo de aprobación.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type, ToSchema)]
#[sqlx(type_name = "tipo_solicitud")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TipoSolicitud {
    #[sqlx(rename = "ALTA")]
    Alta,
    #[sqlx(rename = "TRASPASO")]
    Traspaso,
    #[sqlx(rename = "BAJA")]
    Baja,
    #[sqlx(rename = "REVISION")]
    Revision,
    #[sqlx(rename = "VIGENCIA_PROXIMA")]
    VigenciaProxima,
    #[sqlx(rename = "EQUIPO_PERDIDO")]
    EquipoPerdido,
    #[sqlx(rename = "REPORTE_PROBLEMA")]
    ReporteProblema,
    #[sqlx(rename = "NUEVO_EQUIPO")]
    NuevoEquipo,
    #[sqlx(rename = "EQUIPO_DESHABILITADO")]
    EquipoDeshabilitado,
}

impl TipoSolicitud {
    /// EQUIPO_PERDIDO y VIGENCIA_PROXIMA siempre requieren visto bueno de
    /// calidad; el área técnica no puede concluirlas por su cuenta.
    pub fn concluible_por_tecnica(&self) -> bool {
        !matches!(self, TipoSolicitud::EquipoPerdido | TipoSolicitud::VigenciaProxima)
    }
}

/// Origen de la solicitud, determina el enrutamiento inicial.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type, ToSchema)]
#[sqlx(type_name = "origen_solicitud")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrigenSolicitud {
    #[sqlx(rename = "MUESTREADOR")]
    Muestreador,
    #[sqlx(rename = "TECNICA")]
    Tecnica,
}

/// Estados del flujo de aprobación.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type, ToSchema)]
#[sqlx(type_name = "estado_solicitud")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EstadoSolicitud {
    #[sqlx(rename = "PENDIENTE_TECNICA")]
    PendienteTecnica,
    #[sqlx(rename = "EN_REVISION_TECNICA")]
    EnRevisionTecnica,
    #[sqlx(rename = "PENDIENTE_CALIDAD")]
    PendienteCalidad,
    #[sqlx(rename = "APROBADO")]
    Aprobado,
    #[sqlx(rename = "RECHAZADO")]
    Rechazado,
    #[sqlx(rename = "RECHAZADO_TECNICA")]
    RechazadoTecnica,
}

impl EstadoSolicitud {
    /// Un estado terminal no admite más transiciones.
    pub fn es_terminal(&self) -> bool {
        matches!(
            self,
            EstadoSolicitud::Aprobado | EstadoSolicitud::Rechazado | EstadoSolicitud::RechazadoTecnica
        )
    }
}

/// Acción que el área técnica puede tomar sobre una solicitud en revisión.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccionTecnica {
    Derivado,
    Rechazado,
    Concluido,
}

#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow, ToSchema)]
pub struct Solicitud {
    pub id_solicitud: i32,
    pub tipo_solicitud: TipoSolicitud,
    pub origen_solicitud: OrigenSolicitud,
    pub estado: EstadoSolicitud,
    pub datos_json: Value,
    pub seccion: Option<String>,
    pub usuario_solicita: i32,
    pub usuario_tecnica: Option<i32>,
    pub usuario_aprueba: Option<i32>,
    pub feedback: Option<String>,
    pub feedback_admin: Option<String>,
    pub fecha_solicitud: NaiveDateTime,
    pub fecha_tecnica: Option<NaiveDateTime>,
    pub fecha_final: Option<NaiveDateTime>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NuevaSolicitud {
    pub tipo_solicitud: TipoSolicitud,
    /// Por defecto MUESTREADOR; TECNICA exige capacidad de área técnica.
    pub origen_solicitud: Option<OrigenSolicitud>,
    pub datos_json: Value,
    pub seccion: Option<String>,
    /// Salta la revisión técnica y crea la solicitud en PENDIENTE_CALIDAD.
    /// Solo disponible para área técnica o super admin.
    pub directo_calidad: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AceptarSolicitud {
    pub feedback: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RevisionTecnica {
    pub accion: AccionTecnica,
    pub feedback: Option<String>,
    /// Permite al revisor corregir el payload antes de derivar o concluir.
    pub datos_json: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ActualizarEstado {
    /// Solo APROBADO o RECHAZADO son destinos válidos para calidad.
    pub estado: EstadoSolicitud,
    pub feedback_admin: Option<String>,
    pub datos_json: Option<Value>,
    /// Procesa un único equipo de una solicitud con lista de equipos.
    pub id_equipo_procesado: Option<i32>,
    pub accion_item: Option<AccionItem>,
}

/// Resolución individual de un item dentro de una solicitud con lista.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccionItem {
    Aprobado,
    Rechazado,
}

/// Filtros aceptados por el listado de solicitudes. La política de
/// visibilidad (sección, anti-fuga de calidad) se calcula en el servidor.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct FiltrosSolicitud {
    pub estado: Option<EstadoSolicitud>,
    pub origen_solicitud: Option<OrigenSolicitud>,
    pub solo_mias: Option<bool>,
    pub excluir_mias: Option<bool>,
}
