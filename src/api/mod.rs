pub mod auth;
pub mod equipo;
pub mod ficha;
pub mod health;
pub mod notificacion;
pub mod solicitud;
