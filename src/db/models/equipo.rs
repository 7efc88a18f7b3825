// src/db/models/equipo.rs
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Equipo de laboratorio/terreno con su vigencia y responsable actual.
#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow, ToSchema)]
pub struct Equipo {
    pub id_equipo: i32,
    pub codigo: String,
    pub nombre: String,
    pub tipo: String,
    pub ubicacion: String,
    pub responsable: Option<String>,
    pub id_muestreador: Option<i32>,
    pub fecha_vigencia: Option<NaiveDate>,
    pub habilitado: bool,
    pub version: i32,
    pub fecha_creacion: NaiveDateTime,
    pub fecha_actualizacion: Option<NaiveDateTime>,
}

/// Instantánea de un equipo previa a una mutación, para auditoría/rollback.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct EquipoHistorial {
    pub id_historial: i32,
    pub id_equipo: i32,
    pub codigo: String,
    pub nombre: String,
    pub tipo: String,
    pub ubicacion: String,
    pub responsable: Option<String>,
    pub id_muestreador: Option<i32>,
    pub fecha_vigencia: Option<NaiveDate>,
    pub habilitado: bool,
    pub version: i32,
    pub usuario_cambio: i32,
    pub fecha_cambio: NaiveDateTime,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct FiltrosEquipo {
    /// Busca por coincidencia parcial en código o nombre.
    pub search: Option<String>,
    pub tipo: Option<String>,
    /// "Activo" o "Inactivo"; cualquier otro valor se ignora.
    pub estado: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}
