// src/middleware/auth.rs
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Extension, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use tracing::error;

use crate::api::auth::Claims;
use crate::config::Config;
use crate::utils::api_response::ApiResponse;
use crate::workflow::transition::Actor;

/// Códigos de permiso reconocidos por el sistema. Toda la lógica de acceso
/// pasa por los predicados de [`UserPermissions`], nunca por los strings.
pub mod permisos {
    pub const SUPER_ADMIN: &str = "SUPER_ADMIN";
    pub const AI_MA_ADMIN_ACCESO: &str = "AI_MA_ADMIN_ACCESO";
    pub const AI_MA_SOLICITUDES: &str = "AI_MA_SOLICITUDES";
    pub const AI_MA_EQUIPOS: &str = "AI_MA_EQUIPOS";
    pub const AI_GC_EQUIPOS: &str = "AI_GC_EQUIPOS";
}

/// Cache de permisos RBAC con TTL (`moka`).
pub type PermissionCache = Arc<Cache<i32, UserPermissions>>;

pub fn create_permission_cache() -> PermissionCache {
    Arc::new(
        Cache::builder()
            .time_to_live(Duration::from_secs(600)) // TTL = 10 minutos
            .build(),
    )
}

/// Middleware JWT: valida el token Bearer y deja los claims en extensions.
pub async fn jwt_middleware(mut req: Request<Body>, next: Next) -> Result<Response, Response> {
    let auth_header = req.headers().get("Authorization").ok_or_else(|| {
        ApiResponse::<()>::error(StatusCode::UNAUTHORIZED, "Falta el header Authorization", None)
            .into_response()
    })?;

    let token_str = auth_header.to_str().map_err(|_| {
        ApiResponse::<()>::error(StatusCode::BAD_REQUEST, "Header Authorization inválido", None)
            .into_response()
    })?;

    let token = token_str.strip_prefix("Bearer ").ok_or_else(|| {
        ApiResponse::<()>::error(
            StatusCode::BAD_REQUEST,
            "Formato de token inválido (falta el prefijo 'Bearer ')",
            None,
        )
        .into_response()
    })?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(Config::get().jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::UNAUTHORIZED,
            "Token inválido",
            Some(json!({ "error": e.to_string() })),
        )
        .into_response()
    })?;

    req.extensions_mut().insert(token_data.claims);
    Ok(next.run(req).await)
}

/// Set de permisos de un usuario, con los predicados de capacidad que
/// gobiernan el flujo de solicitudes.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UserPermissions {
    pub user_id: i32,
    pub permisos: HashSet<String>,
}

impl UserPermissions {
    pub fn es_super_admin(&self) -> bool {
        self.permisos.contains(permisos::SUPER_ADMIN)
            || self.permisos.contains(permisos::AI_MA_ADMIN_ACCESO)
    }

    pub fn es_area_tecnica(&self) -> bool {
        self.permisos.contains(permisos::AI_MA_SOLICITUDES)
            || self.permisos.contains(permisos::AI_MA_EQUIPOS)
    }

    pub fn es_area_calidad(&self) -> bool {
        self.permisos.contains(permisos::AI_GC_EQUIPOS)
    }

    /// Actor del flujo de solicitudes con las capacidades ya resueltas.
    pub fn actor(&self) -> Actor {
        Actor {
            id_usuario: self.user_id,
            tecnica: self.es_area_tecnica(),
            calidad: self.es_area_calidad(),
            super_admin: self.es_super_admin(),
        }
    }
}

/// Middleware RBAC: resuelve los permisos del usuario (cache primero) y los
/// deja en extensions para los handlers.
pub async fn rbac_middleware(
    State(db_pool): State<PgPool>,
    Extension(permission_cache): Extension<PermissionCache>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let claims = req.extensions().get::<Claims>().cloned().ok_or_else(|| {
        error!("Faltan los claims JWT en la request");
        ApiResponse::<()>::error(StatusCode::UNAUTHORIZED, "Faltan los claims JWT", None)
            .into_response()
    })?;

    let user_id: i32 = claims.sub.parse().map_err(|_| {
        ApiResponse::<()>::error(
            StatusCode::UNAUTHORIZED,
            "Formato de usuario inválido en el token",
            None,
        )
        .into_response()
    })?;

    if let Some(cached) = permission_cache.get(&user_id) {
        req.extensions_mut().insert(cached);
        return Ok(next.run(req).await);
    }

    let user_permissions = match fetch_permisos(user_id, &db_pool).await {
        Ok(p) => p,
        Err(err) => {
            error!("Fallo al cargar permisos del usuario {user_id}: {err:?}");
            return Err(ApiResponse::<()>::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "No se pudieron cargar los permisos del usuario",
                None,
            )
            .into_response());
        }
    };

    permission_cache.insert(user_id, user_permissions.clone());
    req.extensions_mut().insert(user_permissions);
    Ok(next.run(req).await)
}

async fn fetch_permisos(user_id: i32, pool: &PgPool) -> Result<UserPermissions, sqlx::Error> {
    let codigos: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT p.codigo
        FROM usuario_permisos up
        JOIN permisos p ON p.id_permiso = up.id_permiso
        WHERE up.id_usuario = $1
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(UserPermissions { user_id, permisos: codigos.into_iter().collect() })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn con_permisos(codigos: &[&str]) -> UserPermissions {
        UserPermissions {
            user_id: 1,
            permisos: codigos.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn predicados_de_capacidad() {
        let tecnico = con_permisos(&[permisos::AI_MA_SOLICITUDES]);
        assert!(tecnico.es_area_tecnica());
        assert!(!tecnico.es_area_calidad());
        assert!(!tecnico.es_super_admin());

        let equipos = con_permisos(&[permisos::AI_MA_EQUIPOS]);
        assert!(equipos.es_area_tecnica());

        let calidad = con_permisos(&[permisos::AI_GC_EQUIPOS]);
        assert!(calidad.es_area_calidad());
        assert!(!calidad.es_area_tecnica());

        let admin = con_permisos(&[permisos::AI_MA_ADMIN_ACCESO]);
        assert!(admin.es_super_admin());
    }

    #[test]
    fn actor_refleja_las_capacidades() {
        let actor = con_permisos(&[permisos::AI_GC_EQUIPOS]).actor();
        assert!(actor.calidad && !actor.tecnica && !actor.super_admin);
    }
}
