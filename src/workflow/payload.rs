// src/workflow/payload.rs
//
// `datos_json` tipado: una variante por tipo de solicitud, con su propio
// validador. La creación solo persiste payloads que pasan por acá.

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

use crate::db::models::solicitud::TipoSolicitud;
use crate::workflow::error::WorkflowError;

#[derive(Debug, Deserialize)]
pub struct DatosNuevoEquipo {
    pub codigo: String,
    pub nombre: String,
    pub tipo: String,
    pub ubicacion: String,
    pub responsable: String,
    pub id_muestreador: i32,
    pub vigencia: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct ItemAlta {
    pub id_equipo: i32,
    pub vigencia: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct DatosAlta {
    pub equipos_alta: Vec<ItemAlta>,
}

#[derive(Debug, Deserialize)]
pub struct DatosTraspaso {
    pub id_equipo: i32,
    pub nueva_ubicacion: String,
    pub nuevo_responsable: String,
}

#[derive(Debug, Deserialize)]
pub struct DatosBaja {
    pub equipos_baja: Vec<i32>,
    pub motivo: String,
}

#[derive(Debug, Deserialize)]
pub struct DatosRevision {
    pub id_equipo: i32,
    pub motivo_revision: String,
    pub urgencia: String,
    pub descripcion: String,
}

#[derive(Debug, Deserialize)]
pub struct DatosVigenciaProxima {
    pub id_equipo: i32,
    pub nueva_vigencia_solicitada: NaiveDate,
    pub justificacion: String,
}

#[derive(Debug, Deserialize)]
pub struct DatosEquipoPerdido {
    pub id_equipo: i32,
    pub fecha_incidente: NaiveDate,
    pub tipo_perdida: String,
    pub ubicacion_ultima: String,
    pub circunstancias: String,
    pub acciones_tomadas: String,
}

#[derive(Debug, Deserialize)]
pub struct DatosReporteProblema {
    pub id_equipo: i32,
    pub tipo_problema: String,
    pub frecuencia: String,
    pub descripcion: String,
    pub sintomas: String,
}

#[derive(Debug, Deserialize)]
pub struct DatosEquipoDeshabilitado {
    pub id_equipo: i32,
    pub motivo: String,
    pub vigencia: NaiveDate,
}

/// Unión etiquetada por `tipo_solicitud`. Mantener el match exhaustivo: al
/// agregar un tipo nuevo el compilador obliga a definir su schema.
#[derive(Debug)]
pub enum DatosSolicitud {
    NuevoEquipo(DatosNuevoEquipo),
    Alta(DatosAlta),
    Traspaso(DatosTraspaso),
    Baja(DatosBaja),
    Revision(DatosRevision),
    VigenciaProxima(DatosVigenciaProxima),
    EquipoPerdido(DatosEquipoPerdido),
    ReporteProblema(DatosReporteProblema),
    EquipoDeshabilitado(DatosEquipoDeshabilitado),
}

fn decodificar<T: serde::de::DeserializeOwned>(
    tipo: TipoSolicitud,
    datos: &Value,
) -> Result<T, WorkflowError> {
    serde_json::from_value(datos.clone()).map_err(|e| {
        WorkflowError::Validation(format!("datos_json inválido para {tipo:?}: {e}"))
    })
}

fn no_vacio(campo: &'static str, valor: &str) -> Result<(), WorkflowError> {
    if valor.trim().is_empty() {
        Err(WorkflowError::Validation(format!("El campo '{campo}' es obligatorio")))
    } else {
        Ok(())
    }
}

impl DatosSolicitud {
    /// Decodifica y valida el payload contra el schema del tipo. Un campo
    /// faltante o vacío es `Validation`; nada se persiste.
    pub fn parse(tipo: TipoSolicitud, datos: &Value) -> Result<Self, WorkflowError> {
        match tipo {
            TipoSolicitud::NuevoEquipo => {
                let d: DatosNuevoEquipo = decodificar(tipo, datos)?;
                no_vacio("codigo", &d.codigo)?;
                no_vacio("nombre", &d.nombre)?;
                no_vacio("tipo", &d.tipo)?;
                no_vacio("ubicacion", &d.ubicacion)?;
                no_vacio("responsable", &d.responsable)?;
                Ok(DatosSolicitud::NuevoEquipo(d))
            }
            TipoSolicitud::Alta => {
                let d: DatosAlta = decodificar(tipo, datos)?;
                if d.equipos_alta.is_empty() {
                    return Err(WorkflowError::Validation(
                        "Debe indicar al menos un equipo a reactivar".into(),
                    ));
                }
                Ok(DatosSolicitud::Alta(d))
            }
            TipoSolicitud::Traspaso => {
                let d: DatosTraspaso = decodificar(tipo, datos)?;
                no_vacio("nueva_ubicacion", &d.nueva_ubicacion)?;
                no_vacio("nuevo_responsable", &d.nuevo_responsable)?;
                Ok(DatosSolicitud::Traspaso(d))
            }
            TipoSolicitud::Baja => {
                let d: DatosBaja = decodificar(tipo, datos)?;
                if d.equipos_baja.is_empty() {
                    return Err(WorkflowError::Validation(
                        "Debe indicar al menos un equipo a dar de baja".into(),
                    ));
                }
                no_vacio("motivo", &d.motivo)?;
                Ok(DatosSolicitud::Baja(d))
            }
            TipoSolicitud::Revision => {
                let d: DatosRevision = decodificar(tipo, datos)?;
                no_vacio("motivo_revision", &d.motivo_revision)?;
                no_vacio("urgencia", &d.urgencia)?;
                no_vacio("descripcion", &d.descripcion)?;
                Ok(DatosSolicitud::Revision(d))
            }
            TipoSolicitud::VigenciaProxima => {
                let d: DatosVigenciaProxima = decodificar(tipo, datos)?;
                no_vacio("justificacion", &d.justificacion)?;
                Ok(DatosSolicitud::VigenciaProxima(d))
            }
            TipoSolicitud::EquipoPerdido => {
                let d: DatosEquipoPerdido = decodificar(tipo, datos)?;
                no_vacio("tipo_perdida", &d.tipo_perdida)?;
                no_vacio("ubicacion_ultima", &d.ubicacion_ultima)?;
                no_vacio("circunstancias", &d.circunstancias)?;
                no_vacio("acciones_tomadas", &d.acciones_tomadas)?;
                Ok(DatosSolicitud::EquipoPerdido(d))
            }
            TipoSolicitud::ReporteProblema => {
                let d: DatosReporteProblema = decodificar(tipo, datos)?;
                no_vacio("tipo_problema", &d.tipo_problema)?;
                no_vacio("frecuencia", &d.frecuencia)?;
                no_vacio("descripcion", &d.descripcion)?;
                no_vacio("sintomas", &d.sintomas)?;
                Ok(DatosSolicitud::ReporteProblema(d))
            }
            TipoSolicitud::EquipoDeshabilitado => {
                let d: DatosEquipoDeshabilitado = decodificar(tipo, datos)?;
                no_vacio("motivo", &d.motivo)?;
                Ok(DatosSolicitud::EquipoDeshabilitado(d))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload_completo(tipo: TipoSolicitud) -> Value {
        match tipo {
            TipoSolicitud::NuevoEquipo => json!({
                "codigo": "EQ-001", "nombre": "Multiparámetro", "tipo": "Instrumento",
                "ubicacion": "PM", "responsable": "Juan Pérez", "id_muestreador": 7,
                "vigencia": "2026-01-01",
            }),
            TipoSolicitud::Alta => json!({
                "equipos_alta": [{ "id_equipo": 3, "vigencia": "2026-06-30" }],
            }),
            TipoSolicitud::Traspaso => json!({
                "id_equipo": 3, "nueva_ubicacion": "LAB", "nuevo_responsable": "Ana Soto",
            }),
            TipoSolicitud::Baja => json!({
                "equipos_baja": [3, 4], "motivo": "fin de vida útil",
            }),
            TipoSolicitud::Revision => json!({
                "id_equipo": 3, "motivo_revision": "deriva", "urgencia": "ALTA",
                "descripcion": "lecturas fuera de rango",
            }),
            TipoSolicitud::VigenciaProxima => json!({
                "id_equipo": 3, "nueva_vigencia_solicitada": "2027-01-01",
                "justificacion": "calibración vigente",
            }),
            TipoSolicitud::EquipoPerdido => json!({
                "id_equipo": 3, "fecha_incidente": "2026-02-10", "tipo_perdida": "ROBO",
                "ubicacion_ultima": "camioneta", "circunstancias": "puerta forzada",
                "acciones_tomadas": "denuncia",
            }),
            TipoSolicitud::ReporteProblema => json!({
                "id_equipo": 3, "tipo_problema": "SENSOR", "frecuencia": "intermitente",
                "descripcion": "no enciende", "sintomas": "pantalla parpadea",
            }),
            TipoSolicitud::EquipoDeshabilitado => json!({
                "id_equipo": 3, "motivo": "obsoleto", "vigencia": "2026-12-31",
            }),
        }
    }

    const TIPOS: [TipoSolicitud; 9] = [
        TipoSolicitud::NuevoEquipo,
        TipoSolicitud::Alta,
        TipoSolicitud::Traspaso,
        TipoSolicitud::Baja,
        TipoSolicitud::Revision,
        TipoSolicitud::VigenciaProxima,
        TipoSolicitud::EquipoPerdido,
        TipoSolicitud::ReporteProblema,
        TipoSolicitud::EquipoDeshabilitado,
    ];

    #[test]
    fn payload_completo_pasa_para_todo_tipo() {
        for tipo in TIPOS {
            assert!(DatosSolicitud::parse(tipo, &payload_completo(tipo)).is_ok(), "{tipo:?}");
        }
    }

    #[test]
    fn quitar_cualquier_campo_requerido_falla() {
        for tipo in TIPOS {
            let completo = payload_completo(tipo);
            let campos: Vec<String> =
                completo.as_object().unwrap().keys().cloned().collect();
            for campo in campos {
                let mut recortado = completo.clone();
                recortado.as_object_mut().unwrap().remove(&campo);
                let err = DatosSolicitud::parse(tipo, &recortado).unwrap_err();
                assert!(
                    matches!(err, WorkflowError::Validation(_)),
                    "{tipo:?} sin '{campo}' debería fallar"
                );
            }
        }
    }

    #[test]
    fn campo_en_blanco_cuenta_como_faltante() {
        let mut datos = payload_completo(TipoSolicitud::Traspaso);
        datos["nueva_ubicacion"] = json!("   ");
        let err = DatosSolicitud::parse(TipoSolicitud::Traspaso, &datos).unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }

    #[test]
    fn baja_con_lista_vacia_falla() {
        let datos = json!({ "motivo": "fin de vida util", "equipos_baja": [] });
        let err = DatosSolicitud::parse(TipoSolicitud::Baja, &datos).unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }

    #[test]
    fn alta_con_lista_vacia_falla() {
        let datos = json!({ "equipos_alta": [] });
        let err = DatosSolicitud::parse(TipoSolicitud::Alta, &datos).unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }

    #[test]
    fn vigencia_mal_formada_falla() {
        let mut datos = payload_completo(TipoSolicitud::NuevoEquipo);
        datos["vigencia"] = json!("");
        let err = DatosSolicitud::parse(TipoSolicitud::NuevoEquipo, &datos).unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }
}
