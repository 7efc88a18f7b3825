pub mod equipo;
pub mod ficha;
pub mod notificacion;
pub mod solicitud;
