// src/db/models/notificacion.rs
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Serialize, Deserialize, Clone, Debug, FromRow, ToSchema)]
pub struct Notificacion {
    pub id_notificacion: i32,
    pub titulo: String,
    pub cuerpo: Option<String>,
    pub tipo: String,
    pub datos: Option<Value>,
    pub descartable: bool,
    pub creado_en: NaiveDateTime,
    pub expira_en: Option<NaiveDateTime>,
}

/// Un destinatario puede ser un usuario puntual o todo el grupo que
/// posee un código de permiso (p. ej. los aprobadores de calidad).
#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
pub enum DestinatarioNotificacion {
    #[serde(rename = "usuario")]
    Usuario(i32),
    #[serde(rename = "permiso")]
    Permiso(String),
}
