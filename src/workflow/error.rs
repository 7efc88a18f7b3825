// src/workflow/error.rs
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::utils::api_response::ApiResponse;

/// Errores del flujo de aprobación. El mapeo HTTP vive junto al tipo para
/// que los handlers solo propaguen con `?`.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// Payload incompleto o mal formado. Mensaje seguro para el cliente.
    #[error("{0}")]
    Validation(String),

    /// El actor no posee la capacidad requerida por la transición.
    #[error("{0}")]
    PermissionDenied(String),

    /// La solicitud no está en un estado que admita la acción pedida,
    /// incluida la carrera de doble procesamiento.
    #[error("La solicitud no puede ser procesada en su estado actual")]
    InvalidTransition,

    #[error("Recurso no encontrado")]
    NotFound,

    /// Falla de un colaborador de persistencia. No se exponen detalles.
    #[error("Error interno del servidor")]
    Dependency(#[from] sqlx::Error),
}

impl WorkflowError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            WorkflowError::Validation(_) => StatusCode::BAD_REQUEST,
            WorkflowError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            WorkflowError::InvalidTransition => StatusCode::CONFLICT,
            WorkflowError::NotFound => StatusCode::NOT_FOUND,
            WorkflowError::Dependency(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WorkflowError {
    fn into_response(self) -> Response {
        if let WorkflowError::Dependency(ref e) = self {
            error!("Fallo de persistencia: {e:?}");
        }
        ApiResponse::<()>::error(self.status_code(), self.to_string(), None).into_response()
    }
}
