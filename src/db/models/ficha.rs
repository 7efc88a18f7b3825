// src/db/models/ficha.rs
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::workflow::error::WorkflowError;

/// Veredicto de la jefatura técnica sobre una ficha.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type, ToSchema)]
#[sqlx(type_name = "validacion_ficha")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidacionFicha {
    #[sqlx(rename = "PENDIENTE")]
    Pendiente,
    #[sqlx(rename = "APROBADA")]
    Aprobada,
    #[sqlx(rename = "RECHAZADA")]
    Rechazada,
}

/// Encabezado de una ficha de ingreso de servicio: los antecedentes
/// comerciales del muestreo más el estado de su validación técnica.
#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow, ToSchema)]
pub struct Ficha {
    pub id_ficha: i32,
    /// Correlativo legible, derivado del id.
    pub correlativo: String,
    pub tipo_ficha: String,
    pub cliente: String,
    pub objetivo: String,
    pub punto_muestreo: String,
    pub coordenadas: Option<String>,
    pub responsable_muestreo: String,
    pub observaciones_comercial: Option<String>,
    pub validacion_tecnica: ValidacionFicha,
    pub observaciones_tecnica: Option<String>,
    pub usuario_crea: i32,
    pub fecha_creacion: NaiveDateTime,
}

/// Un análisis solicitado dentro de la ficha.
#[derive(Debug, Serialize, Deserialize, Clone, sqlx::FromRow, ToSchema)]
pub struct FichaDetalle {
    pub id_detalle: i32,
    pub id_ficha: i32,
    pub item: i32,
    pub tecnica: String,
    pub normativa: Option<String>,
    pub tipo_analisis: String,
    pub limite_max: Option<f64>,
    pub laboratorio: Option<String>,
}

/// Ficha con su detalle de análisis, como la devuelve la consulta puntual.
#[derive(Debug, Serialize, ToSchema)]
pub struct FichaCompleta {
    #[serde(flatten)]
    pub ficha: Ficha,
    pub detalles: Vec<FichaDetalle>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NuevoDetalleFicha {
    pub tecnica: String,
    pub normativa: Option<String>,
    pub tipo_analisis: String,
    pub limite_max: Option<f64>,
    pub laboratorio: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NuevaFicha {
    pub tipo_ficha: String,
    pub cliente: String,
    pub objetivo: String,
    pub punto_muestreo: String,
    pub coordenadas: Option<String>,
    pub responsable_muestreo: String,
    pub observaciones: Option<String>,
    pub detalles: Vec<NuevoDetalleFicha>,
}

impl NuevaFicha {
    /// Valida los antecedentes antes de tocar la base: encabezado completo y
    /// al menos un análisis con técnica.
    pub fn validar(&self) -> Result<(), WorkflowError> {
        fn requerido(campo: &'static str, valor: &str) -> Result<(), WorkflowError> {
            if valor.trim().is_empty() {
                Err(WorkflowError::Validation(format!("El campo '{campo}' es obligatorio")))
            } else {
                Ok(())
            }
        }

        requerido("tipo_ficha", &self.tipo_ficha)?;
        requerido("cliente", &self.cliente)?;
        requerido("objetivo", &self.objetivo)?;
        requerido("punto_muestreo", &self.punto_muestreo)?;
        requerido("responsable_muestreo", &self.responsable_muestreo)?;

        if self.detalles.is_empty() {
            return Err(WorkflowError::Validation(
                "La ficha debe incluir al menos un análisis".into(),
            ));
        }
        for detalle in &self.detalles {
            requerido("tecnica", &detalle.tecnica)?;
            requerido("tipo_analisis", &detalle.tipo_analisis)?;
        }
        Ok(())
    }
}

/// Resolución de la validación técnica de una ficha.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ValidarFicha {
    /// APROBADA o RECHAZADA; PENDIENTE no es un destino válido.
    pub resultado: ValidacionFicha,
    pub observaciones: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ficha_valida() -> NuevaFicha {
        NuevaFicha {
            tipo_ficha: "PUNTUAL".into(),
            cliente: "Minera Andes".into(),
            objetivo: "Autocontrol RCA".into(),
            punto_muestreo: "Descarga N°1".into(),
            coordenadas: Some("19H UTM 6350000E 355000S".into()),
            responsable_muestreo: "Ana Soto".into(),
            observaciones: None,
            detalles: vec![NuevoDetalleFicha {
                tecnica: "pH".into(),
                normativa: Some("DS90".into()),
                tipo_analisis: "Terreno".into(),
                limite_max: Some(8.5),
                laboratorio: None,
            }],
        }
    }

    #[test]
    fn ficha_completa_pasa() {
        assert!(ficha_valida().validar().is_ok());
    }

    #[test]
    fn encabezado_incompleto_falla() {
        for campo in ["cliente", "objetivo", "punto_muestreo", "responsable_muestreo"] {
            let mut ficha = ficha_valida();
            match campo {
                "cliente" => ficha.cliente = "  ".into(),
                "objetivo" => ficha.objetivo = String::new(),
                "punto_muestreo" => ficha.punto_muestreo = " ".into(),
                _ => ficha.responsable_muestreo = String::new(),
            }
            let err = ficha.validar().unwrap_err();
            assert!(matches!(err, WorkflowError::Validation(_)), "{campo}");
        }
    }

    #[test]
    fn ficha_sin_analisis_falla() {
        let mut ficha = ficha_valida();
        ficha.detalles.clear();
        let err = ficha.validar().unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }

    #[test]
    fn detalle_sin_tecnica_falla() {
        let mut ficha = ficha_valida();
        ficha.detalles[0].tecnica = " ".into();
        let err = ficha.validar().unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }
}
