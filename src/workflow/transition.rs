// src/workflow/transition.rs
//
// Máquina de estados del flujo de solicitudes, como tabla de transiciones
// pura (estado × acción → estado siguiente + capacidad requerida) más una
// función `aplicar_transicion` independiente de HTTP y SQL.

use chrono::NaiveDateTime;

use crate::db::models::solicitud::{EstadoSolicitud, OrigenSolicitud, Solicitud, TipoSolicitud};
use crate::workflow::error::WorkflowError;

/// Capacidades nombradas que gobiernan las transiciones. Los handlers las
/// derivan una sola vez del set de permisos; la tabla nunca ve strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacidad {
    Tecnica,
    Calidad,
}

/// Actor que intenta una transición, con sus capacidades ya resueltas.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub id_usuario: i32,
    pub tecnica: bool,
    pub calidad: bool,
    pub super_admin: bool,
}

impl Actor {
    pub fn tiene(&self, capacidad: Capacidad) -> bool {
        if self.super_admin {
            return true;
        }
        match capacidad {
            Capacidad::Tecnica => self.tecnica,
            Capacidad::Calidad => self.calidad,
        }
    }
}

/// Acciones del flujo. `Aceptar` toma la solicitud para revisión; las demás
/// la resuelven o la pasan a la siguiente etapa.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accion {
    Aceptar,
    Derivar,
    RechazarTecnica,
    Concluir,
    Aprobar,
    Rechazar,
}

/// Tabla de transiciones. `None` significa acción ilegal desde ese estado.
fn transicion(desde: EstadoSolicitud, accion: Accion) -> Option<(EstadoSolicitud, Capacidad)> {
    use Accion::*;
    use EstadoSolicitud::*;
    match (desde, accion) {
        (PendienteTecnica, Aceptar) => Some((EnRevisionTecnica, Capacidad::Tecnica)),
        (PendienteTecnica, Derivar) => Some((PendienteCalidad, Capacidad::Tecnica)),
        (PendienteTecnica, RechazarTecnica) => Some((RechazadoTecnica, Capacidad::Tecnica)),
        (PendienteTecnica, Concluir) => Some((Aprobado, Capacidad::Tecnica)),
        (EnRevisionTecnica, Derivar) => Some((PendienteCalidad, Capacidad::Tecnica)),
        (EnRevisionTecnica, RechazarTecnica) => Some((RechazadoTecnica, Capacidad::Tecnica)),
        (EnRevisionTecnica, Concluir) => Some((Aprobado, Capacidad::Tecnica)),
        (PendienteCalidad, Aprobar) => Some((Aprobado, Capacidad::Calidad)),
        (PendienteCalidad, Rechazar) => Some((Rechazado, Capacidad::Calidad)),
        _ => None,
    }
}

/// Mutación que una transición legal produce sobre la solicitud. La capa de
/// persistencia la aplica de forma atómica (CAS sobre `estado`); los tests la
/// aplican en memoria con [`ResultadoTransicion::aplicar`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultadoTransicion {
    pub desde: EstadoSolicitud,
    pub hacia: EstadoSolicitud,
    pub usuario_tecnica: Option<i32>,
    pub usuario_aprueba: Option<i32>,
    pub feedback: Option<String>,
    pub feedback_admin: Option<String>,
    pub marca_fecha_tecnica: bool,
    pub marca_fecha_final: bool,
}

impl ResultadoTransicion {
    pub fn aplicar(&self, solicitud: &mut Solicitud, ahora: NaiveDateTime) {
        solicitud.estado = self.hacia;
        if let Some(u) = self.usuario_tecnica {
            solicitud.usuario_tecnica = Some(u);
        }
        if let Some(u) = self.usuario_aprueba {
            solicitud.usuario_aprueba = Some(u);
        }
        if let Some(f) = &self.feedback {
            solicitud.feedback = Some(f.clone());
        }
        if let Some(f) = &self.feedback_admin {
            solicitud.feedback_admin = Some(f.clone());
        }
        if self.marca_fecha_tecnica {
            solicitud.fecha_tecnica = Some(ahora);
        }
        if self.marca_fecha_final {
            solicitud.fecha_final = Some(ahora);
        }
    }
}

fn feedback_limpio(feedback: Option<&str>) -> Option<String> {
    feedback.map(str::trim).filter(|f| !f.is_empty()).map(str::to_owned)
}

/// Estado inicial de una solicitud recién creada. El origen TECNICA y la
/// bandera `directo_calidad` saltan la etapa técnica, pero solo para un
/// solicitante con capacidad técnica (o super admin).
pub fn estado_inicial(
    origen: OrigenSolicitud,
    directo_calidad: bool,
    actor: &Actor,
) -> Result<EstadoSolicitud, WorkflowError> {
    let salta_tecnica = origen == OrigenSolicitud::Tecnica || directo_calidad;
    if !salta_tecnica {
        return Ok(EstadoSolicitud::PendienteTecnica);
    }
    if actor.tiene(Capacidad::Tecnica) {
        Ok(EstadoSolicitud::PendienteCalidad)
    } else {
        Err(WorkflowError::PermissionDenied(
            "Solo el área técnica puede crear solicitudes directas a calidad".into(),
        ))
    }
}

/// Valida una transición y calcula la mutación resultante.
///
/// El orden de chequeo fija la taxonomía de error: estado ilegal (incluidos
/// los terminales) → InvalidTransition, capacidad faltante → PermissionDenied,
/// reglas de feedback/tipo → Validation.
pub fn aplicar_transicion(
    solicitud: &Solicitud,
    accion: Accion,
    actor: &Actor,
    feedback: Option<&str>,
) -> Result<ResultadoTransicion, WorkflowError> {
    let (hacia, capacidad) =
        transicion(solicitud.estado, accion).ok_or(WorkflowError::InvalidTransition)?;

    if !actor.tiene(capacidad) {
        return Err(WorkflowError::PermissionDenied(
            "No tiene permisos para realizar esta acción".into(),
        ));
    }

    let feedback = feedback_limpio(feedback);

    if matches!(accion, Accion::RechazarTecnica | Accion::Rechazar) && feedback.is_none() {
        return Err(WorkflowError::Validation(
            "El feedback es obligatorio al rechazar una solicitud".into(),
        ));
    }

    if accion == Accion::Concluir && !solicitud.tipo_solicitud.concluible_por_tecnica() {
        return Err(WorkflowError::Validation(
            "Este tipo de solicitud requiere aprobación del área de calidad".into(),
        ));
    }

    // Las consultas generales derivadas a calidad deben llevar comentario
    // del revisor para que calidad tenga contexto.
    if accion == Accion::Derivar
        && solicitud.tipo_solicitud == TipoSolicitud::Revision
        && solicitud.datos_json.get("urgencia").and_then(|v| v.as_str()) == Some("CONSULTA_GENERAL")
        && feedback.is_none()
    {
        return Err(WorkflowError::Validation(
            "Debe indicar un comentario al derivar una consulta general".into(),
        ));
    }

    let es_tecnica = capacidad == Capacidad::Tecnica;
    let resuelve_tecnica = es_tecnica && accion != Accion::Aceptar;

    Ok(ResultadoTransicion {
        desde: solicitud.estado,
        hacia,
        usuario_tecnica: es_tecnica.then_some(actor.id_usuario),
        usuario_aprueba: hacia.es_terminal().then_some(actor.id_usuario),
        feedback: es_tecnica.then_some(feedback.clone()).flatten(),
        feedback_admin: (!es_tecnica).then_some(feedback).flatten(),
        marca_fecha_tecnica: resuelve_tecnica,
        marca_fecha_final: hacia.es_terminal(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn tecnico(id: i32) -> Actor {
        Actor { id_usuario: id, tecnica: true, calidad: false, super_admin: false }
    }

    fn calidad(id: i32) -> Actor {
        Actor { id_usuario: id, tecnica: false, calidad: true, super_admin: false }
    }

    fn muestreador(id: i32) -> Actor {
        Actor { id_usuario: id, tecnica: false, calidad: false, super_admin: false }
    }

    fn super_admin(id: i32) -> Actor {
        Actor { id_usuario: id, tecnica: false, calidad: false, super_admin: true }
    }

    fn solicitud(tipo: TipoSolicitud, estado: EstadoSolicitud) -> Solicitud {
        Solicitud {
            id_solicitud: 1,
            tipo_solicitud: tipo,
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
    fn origen_muestreador_entra_pendiente_tecnica() {
        let estado = estado_inicial(OrigenSolicitud::Muestreador, false, &muestreador(7)).unwrap();
        assert_eq!(estado, EstadoSolicitud::PendienteTecnica);
    }

    #[test]
    fn origen_tecnica_salta_a_calidad() {
        let estado = estado_inicial(OrigenSolicitud::Tecnica, false, &tecnico(5)).unwrap();
        assert_eq!(estado, EstadoSolicitud::PendienteCalidad);
    }

    #[test]
    fn directo_calidad_exige_capacidad_tecnica() {
        let err = estado_inicial(OrigenSolicitud::Muestreador, true, &muestreador(7)).unwrap_err();
        assert!(matches!(err, WorkflowError::PermissionDenied(_)));

        let estado = estado_inicial(OrigenSolicitud::Muestreador, true, &super_admin(1)).unwrap();
        assert_eq!(estado, EstadoSolicitud::PendienteCalidad);
    }

    #[test]
    fn aceptar_solo_desde_pendiente_tecnica() {
        let sol = solicitud(TipoSolicitud::NuevoEquipo, EstadoSolicitud::PendienteTecnica);
        let resultado = aplicar_transicion(&sol, Accion::Aceptar, &tecnico(5), None).unwrap();
        assert_eq!(resultado.hacia, EstadoSolicitud::EnRevisionTecnica);
        assert_eq!(resultado.usuario_tecnica, Some(5));

        let sol = solicitud(TipoSolicitud::NuevoEquipo, EstadoSolicitud::EnRevisionTecnica);
        let err = aplicar_transicion(&sol, Accion::Aceptar, &tecnico(5), None).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition));
    }

    #[test]
    fn aceptar_exige_area_tecnica() {
        let sol = solicitud(TipoSolicitud::NuevoEquipo, EstadoSolicitud::PendienteTecnica);
        let err = aplicar_transicion(&sol, Accion::Aceptar, &muestreador(7), None).unwrap_err();
        assert!(matches!(err, WorkflowError::PermissionDenied(_)));
    }

    #[test]
    fn rechazo_tecnico_sin_feedback_falla() {
        let sol = solicitud(TipoSolicitud::Baja, EstadoSolicitud::PendienteTecnica);
        let err = aplicar_transicion(&sol, Accion::RechazarTecnica, &tecnico(5), Some("  ")).unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));

        let resultado =
            aplicar_transicion(&sol, Accion::RechazarTecnica, &tecnico(5), Some("incompleta")).unwrap();
        assert_eq!(resultado.hacia, EstadoSolicitud::RechazadoTecnica);
        assert_eq!(resultado.feedback.as_deref(), Some("incompleta"));
        assert!(resultado.marca_fecha_final);
    }

    #[test]
    fn rechazo_tecnico_es_terminal() {
        let mut sol = solicitud(TipoSolicitud::Baja, EstadoSolicitud::PendienteTecnica);
        let resultado =
            aplicar_transicion(&sol, Accion::RechazarTecnica, &tecnico(5), Some("motivo")).unwrap();
        resultado.aplicar(&mut sol, Utc::now().naive_utc());

        for accion in [Accion::Aceptar, Accion::Derivar, Accion::Concluir, Accion::Aprobar] {
            let err = aplicar_transicion(&sol, accion, &super_admin(1), Some("x")).unwrap_err();
            assert!(matches!(err, WorkflowError::InvalidTransition));
        }
    }

    #[test]
    fn concluir_prohibido_para_tipos_con_calidad_obligatoria() {
        for tipo in [TipoSolicitud::EquipoPerdido, TipoSolicitud::VigenciaProxima] {
            for estado in [EstadoSolicitud::PendienteTecnica, EstadoSolicitud::EnRevisionTecnica] {
                let sol = solicitud(tipo, estado);
                let err = aplicar_transicion(&sol, Accion::Concluir, &tecnico(5), None).unwrap_err();
                assert!(matches!(err, WorkflowError::Validation(_)), "{tipo:?} desde {estado:?}");
            }
        }
    }

    #[test]
    fn concluir_permitido_para_el_resto() {
        let sol = solicitud(TipoSolicitud::Traspaso, EstadoSolicitud::EnRevisionTecnica);
        let resultado = aplicar_transicion(&sol, Accion::Concluir, &tecnico(5), None).unwrap();
        assert_eq!(resultado.hacia, EstadoSolicitud::Aprobado);
        assert_eq!(resultado.usuario_aprueba, Some(5));
        assert!(resultado.marca_fecha_tecnica && resultado.marca_fecha_final);
    }

    #[test]
    fn derivar_consulta_general_exige_comentario() {
        let mut sol = solicitud(TipoSolicitud::Revision, EstadoSolicitud::EnRevisionTecnica);
        sol.datos_json = json!({ "urgencia": "CONSULTA_GENERAL" });

        let err = aplicar_transicion(&sol, Accion::Derivar, &tecnico(5), None).unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));

        let resultado = aplicar_transicion(&sol, Accion::Derivar, &tecnico(5), Some("ok")).unwrap();
        assert_eq!(resultado.hacia, EstadoSolicitud::PendienteCalidad);
    }

    #[test]
    fn aprobar_exige_calidad_y_estado_pendiente_calidad() {
        let sol = solicitud(TipoSolicitud::NuevoEquipo, EstadoSolicitud::PendienteCalidad);

        let err = aplicar_transicion(&sol, Accion::Aprobar, &tecnico(5), None).unwrap_err();
        assert!(matches!(err, WorkflowError::PermissionDenied(_)));

        let resultado = aplicar_transicion(&sol, Accion::Aprobar, &calidad(9), None).unwrap();
        assert_eq!(resultado.hacia, EstadoSolicitud::Aprobado);

        let sol = solicitud(TipoSolicitud::NuevoEquipo, EstadoSolicitud::PendienteTecnica);
        let err = aplicar_transicion(&sol, Accion::Aprobar, &calidad(9), None).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition));
    }

    #[test]
    fn rechazo_de_calidad_escribe_feedback_admin() {
        let sol = solicitud(TipoSolicitud::Alta, EstadoSolicitud::PendienteCalidad);
        let resultado =
            aplicar_transicion(&sol, Accion::Rechazar, &calidad(9), Some("sin sustento")).unwrap();
        assert_eq!(resultado.hacia, EstadoSolicitud::Rechazado);
        assert_eq!(resultado.feedback_admin.as_deref(), Some("sin sustento"));
        assert!(resultado.feedback.is_none());
    }

    // Ciclo completo: crear, aceptar, derivar y aprobar.
    #[test]
    fn ciclo_completo_nuevo_equipo() {
        let ahora = Utc::now().naive_utc();
        let mut sol = solicitud(TipoSolicitud::NuevoEquipo, EstadoSolicitud::PendienteTecnica);
        sol.datos_json = json!({
            "codigo": "EQ-001",
            "nombre": "Multiparámetro",
            "tipo": "Instrumento",
            "ubicacion": "PM",
            "responsable": "Juan Pérez",
            "id_muestreador": 7,
            "vigencia": "2026-01-01",
        });

        let paso = aplicar_transicion(&sol, Accion::Aceptar, &tecnico(5), None).unwrap();
        paso.aplicar(&mut sol, ahora);
        assert_eq!(sol.estado, EstadoSolicitud::EnRevisionTecnica);
        assert_eq!(sol.usuario_tecnica, Some(5));

        let paso = aplicar_transicion(&sol, Accion::Derivar, &tecnico(5), Some("ok")).unwrap();
        paso.aplicar(&mut sol, ahora);
        assert_eq!(sol.estado, EstadoSolicitud::PendienteCalidad);
        assert_eq!(sol.fecha_tecnica, Some(ahora));

        let paso = aplicar_transicion(&sol, Accion::Aprobar, &calidad(9), Some("aprobado")).unwrap();
        paso.aplicar(&mut sol, ahora);
        assert_eq!(sol.estado, EstadoSolicitud::Aprobado);
        assert_eq!(sol.usuario_aprueba, Some(9));
        assert_eq!(sol.fecha_final, Some(ahora));

        // Inmutable una vez terminal.
        for accion in [Accion::Derivar, Accion::Aprobar, Accion::Rechazar] {
            let err = aplicar_transicion(&sol, accion, &super_admin(1), Some("x")).unwrap_err();
            assert!(matches!(err, WorkflowError::InvalidTransition));
        }
    }

    #[test]
    fn super_admin_satisface_ambas_capacidades() {
        let sol = solicitud(TipoSolicitud::Baja, EstadoSolicitud::PendienteTecnica);
        assert!(aplicar_transicion(&sol, Accion::Aceptar, &super_admin(1), None).is_ok());

        let sol = solicitud(TipoSolicitud::Baja, EstadoSolicitud::PendienteCalidad);
        assert!(aplicar_transicion(&sol, Accion::Aprobar, &super_admin(1), None).is_ok());
    }
}
