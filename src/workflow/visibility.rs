// src/workflow/visibility.rs
//
// Política de visibilidad del listado de solicitudes, calculada una vez por
// consulta a partir de las capacidades del usuario. La capa SQL traduce el
// alcance a condiciones; `permite` es el mismo predicado en memoria.

use crate::db::models::solicitud::{EstadoSolicitud, Solicitud};
use crate::workflow::transition::Actor;

/// Secciones organizacionales bajo el ámbito del área técnica.
pub const SECCIONES_TECNICA: &[&str] = &["MA", "PM", "LAB"];

/// Alcance efectivo de un listado.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlcanceListado {
    /// Listado vacío garantizado (sin permiso de visibilidad y sin solo_mias).
    pub vacio: bool,
    /// Restringe a solicitudes propias (solo_mias).
    pub usuario_solicita: Option<i32>,
    /// Excluye las solicitudes propias (excluir_mias).
    pub usuario_excluir: Option<i32>,
    /// Restringe por sección; las propias se incluyen igual vía
    /// `siempre_incluir_usuario`.
    pub secciones: Option<Vec<String>>,
    pub siempre_incluir_usuario: Option<i32>,
    /// Regla anti-fuga: calidad sin capacidad técnica no ve trabajo que
    /// sigue en manos del área técnica.
    pub excluir_pendiente_tecnica: bool,
}

impl AlcanceListado {
    fn todo() -> Self {
        AlcanceListado {
            vacio: false,
            usuario_solicita: None,
            usuario_excluir: None,
            secciones: None,
            siempre_incluir_usuario: None,
            excluir_pendiente_tecnica: false,
        }
    }

    fn nada() -> Self {
        AlcanceListado { vacio: true, ..AlcanceListado::todo() }
    }

    /// Equivalente en memoria de las condiciones SQL que este alcance
    /// produce. Se usa en tests y debe mantenerse en sincronía con
    /// `db::queries::solicitud::listar_solicitudes`.
    pub fn permite(&self, solicitud: &Solicitud) -> bool {
        if self.vacio {
            return false;
        }
        if let Some(u) = self.usuario_solicita {
            if solicitud.usuario_solicita != u {
                return false;
            }
        }
        if let Some(u) = self.usuario_excluir {
            if solicitud.usuario_solicita == u {
                return false;
            }
        }
        if self.excluir_pendiente_tecnica && solicitud.estado == EstadoSolicitud::PendienteTecnica {
            return false;
        }
        if let Some(secciones) = &self.secciones {
            let propia = self.siempre_incluir_usuario == Some(solicitud.usuario_solicita);
            let en_seccion = solicitud
                .seccion
                .as_deref()
                .is_some_and(|s| secciones.iter().any(|sec| sec == s));
            if !propia && !en_seccion {
                return false;
            }
        }
        true
    }
}

/// Calcula el alcance del listado para un actor dado.
pub fn alcance_para(actor: &Actor, solo_mias: bool, excluir_mias: bool) -> AlcanceListado {
    let usuario_excluir = excluir_mias.then_some(actor.id_usuario);

    // Ver solo lo propio no requiere permiso alguno y salta el scoping
    // por sección.
    if solo_mias {
        return AlcanceListado {
            usuario_solicita: Some(actor.id_usuario),
            usuario_excluir,
            ..AlcanceListado::todo()
        };
    }

    if actor.super_admin {
        return AlcanceListado { usuario_excluir, ..AlcanceListado::todo() };
    }

    if actor.tecnica {
        return AlcanceListado {
            usuario_excluir,
            secciones: Some(SECCIONES_TECNICA.iter().map(|s| s.to_string()).collect()),
            siempre_incluir_usuario: Some(actor.id_usuario),
            ..AlcanceListado::todo()
        };
    }

    if actor.calidad {
        return AlcanceListado {
            usuario_excluir,
            excluir_pendiente_tecnica: true,
            ..AlcanceListado::todo()
        };
    }

    AlcanceListado::nada()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::solicitud::{OrigenSolicitud, TipoSolicitud};
    use chrono::Utc;
    use serde_json::json;

    fn actor(id: i32, tecnica: bool, calidad: bool, super_admin: bool) -> Actor {
        Actor { id_usuario: id, tecnica, calidad, super_admin }
    }

    fn solicitud(usuario: i32, estado: EstadoSolicitud, seccion: Option<&str>) -> Solicitud {
        Solicitud {
            id_solicitud: 1,
            tipo_solicitud: TipoSolicitud::Revision,
            origen_solicitud: OrigenSolicitud::Muestreador,
            estado,
            datos_json: json!({}),
            seccion: seccion.map(str::to_owned),
            usuario_solicita: usuario,
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
    fn super_admin_ve_todo() {
        let alcance = alcance_para(&actor(1, false, false, true), false, false);
        assert!(alcance.permite(&solicitud(7, EstadoSolicitud::PendienteTecnica, None)));
        assert!(alcance.permite(&solicitud(8, EstadoSolicitud::Aprobado, Some("XX"))));
    }

    #[test]
    fn calidad_sin_tecnica_no_ve_pendiente_tecnica() {
        let alcance = alcance_para(&actor(9, false, true, false), false, false);
        assert!(alcance.excluir_pendiente_tecnica);
        assert!(!alcance.permite(&solicitud(7, EstadoSolicitud::PendienteTecnica, Some("MA"))));
        assert!(alcance.permite(&solicitud(7, EstadoSolicitud::PendienteCalidad, Some("MA"))));
        assert!(alcance.permite(&solicitud(7, EstadoSolicitud::Aprobado, None)));
    }

    #[test]
    fn calidad_con_tecnica_si_ve_pendiente_tecnica() {
        let alcance = alcance_para(&actor(9, true, true, false), false, false);
        assert!(!alcance.excluir_pendiente_tecnica);
        assert!(alcance.permite(&solicitud(7, EstadoSolicitud::PendienteTecnica, Some("MA"))));
    }

    #[test]
    fn tecnica_queda_acotada_a_sus_secciones() {
        let alcance = alcance_para(&actor(5, true, false, false), false, false);
        assert!(alcance.permite(&solicitud(7, EstadoSolicitud::PendienteTecnica, Some("MA"))));
        assert!(alcance.permite(&solicitud(7, EstadoSolicitud::PendienteTecnica, Some("LAB"))));
        assert!(!alcance.permite(&solicitud(7, EstadoSolicitud::PendienteTecnica, Some("GC"))));
        assert!(!alcance.permite(&solicitud(7, EstadoSolicitud::PendienteTecnica, None)));
        // Las propias entran aunque estén fuera de sección.
        assert!(alcance.permite(&solicitud(5, EstadoSolicitud::PendienteTecnica, Some("GC"))));
    }

    #[test]
    fn solo_mias_salta_el_scoping_por_seccion() {
        let alcance = alcance_para(&actor(7, false, false, false), true, false);
        assert!(alcance.permite(&solicitud(7, EstadoSolicitud::PendienteTecnica, Some("GC"))));
        assert!(!alcance.permite(&solicitud(8, EstadoSolicitud::PendienteTecnica, Some("MA"))));
    }

    #[test]
    fn sin_permisos_el_resultado_es_vacio_no_error() {
        let alcance = alcance_para(&actor(7, false, false, false), false, false);
        assert!(alcance.vacio);
        assert!(!alcance.permite(&solicitud(7, EstadoSolicitud::Aprobado, None)));
    }

    #[test]
    fn excluir_mias_filtra_las_propias() {
        let alcance = alcance_para(&actor(1, false, false, true), false, true);
        assert!(!alcance.permite(&solicitud(1, EstadoSolicitud::PendienteCalidad, None)));
        assert!(alcance.permite(&solicitud(2, EstadoSolicitud::PendienteCalidad, None)));
    }
}
