//! Núcleo puro del flujo de solicitudes: tabla de transiciones, validación
//! de payloads por tipo y política de visibilidad. Sin HTTP ni SQL.

pub mod error;
pub mod payload;
pub mod transition;
pub mod visibility;
