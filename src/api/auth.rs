use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Extension, Json, Router,
};
use bcrypt::{hash, verify, DEFAULT_COST};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::config::Config;
use crate::utils::api_response::ApiResponse;
use crate::workflow::error::WorkflowError;

/// Solicitud de registro de un usuario nuevo.
#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub nombre: String,
    pub correo: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct RegisterResponse {
    pub message: String,
}

/// Claims del JWT. Los permisos NO viajan en el token: se resuelven por
/// request contra la base, así una revocación aplica de inmediato.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Id de usuario como string.
    pub sub: String,
    pub username: String,
    /// Expiración (UNIX time).
    pub exp: usize,
}

impl Claims {
    /// Convierte `sub` a `i32`; un token con sub no numérico es inválido.
    pub fn user_id(&self) -> Result<i32, WorkflowError> {
        self.sub
            .parse::<i32>()
            .map_err(|_| WorkflowError::Validation("Token con id de usuario inválido".into()))
    }
}

#[derive(Serialize, Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
}

#[derive(sqlx::FromRow)]
struct CredencialesRow {
    id_usuario: i32,
    username: String,
    password_hash: String,
    habilitado: bool,
}

/// Autentica y emite un JWT de 10 horas.
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Authentication",
    request_body(content = LoginRequest, description = "Credenciales del usuario"),
    responses(
        (status = 200, description = "Login correcto", body = LoginResponse),
        (status = 401, description = "Usuario o contraseña incorrectos"),
        (status = 403, description = "Cuenta deshabilitada"),
        (status = 500, description = "Error interno")
    )
)]
pub async fn login(
    State(pool): State<PgPool>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, (StatusCode, String)> {
    let config = Config::get();

    let usuario = sqlx::query_as::<_, CredencialesRow>(
        "SELECT id_usuario, username, password_hash, habilitado \
         FROM usuarios WHERE username = $1",
    )
    .bind(&payload.username)
    .fetch_optional(&pool)
    .await
    .map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"success": false, "message": format!("Database error: {e}")}).to_string(),
        )
    })?;

    if let Some(usuario) = usuario {
        if !usuario.habilitado {
            warn!("Intento de login con cuenta deshabilitada: {}", payload.username);
            return Err((
                StatusCode::FORBIDDEN,
                json!({"success": false, "message": "Cuenta deshabilitada. Contacte al administrador."})
                    .to_string(),
            ));
        }

        match verify(&payload.password, &usuario.password_hash) {
            Ok(true) => {
                let claims = Claims {
                    sub: usuario.id_usuario.to_string(),
                    username: usuario.username.clone(),
                    exp: chrono::Utc::now().timestamp() as usize + 36000,
                };
                let token = encode(
                    &Header::default(),
                    &claims,
                    &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
                )
                .map_err(|e| {
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        json!({"success": false, "message": format!("Token generation failed: {e}")})
                            .to_string(),
                    )
                })?;

                info!("Login correcto para {}", payload.username);
                return Ok(Json(LoginResponse { token, username: usuario.username }));
            }
            Ok(false) => {
                warn!("Contraseña inválida para {}", payload.username);
                return Err((
                    StatusCode::UNAUTHORIZED,
                    json!({"success": false, "message": "Usuario o contraseña incorrectos."})
                        .to_string(),
                ));
            }
            Err(e) => {
                error!("Error verificando contraseña: {e}");
                return Err((
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"success": false, "message": format!("Password verification error: {e}")})
                        .to_string(),
                ));
            }
        }
    }

    warn!("Intento de login de usuario inexistente: {}", payload.username);
    Err((
        StatusCode::UNAUTHORIZED,
        json!({"success": false, "message": "Usuario o contraseña incorrectos."}).to_string(),
    ))
}

/// Registra un usuario. Nace habilitado pero sin permisos: los códigos se
/// asignan después por un administrador.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    tag = "Authentication",
    responses(
        (status = 200, description = "Usuario registrado", body = RegisterResponse),
        (status = 409, description = "Username ya ocupado"),
        (status = 500, description = "Error interno")
    )
)]
pub async fn register(
    State(pool): State<PgPool>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, (StatusCode, String)> {
    let password_hash = hash(&payload.password, DEFAULT_COST).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"success": false, "message": format!("Password hashing failed: {e}")})
                .to_string(),
        )
    })?;

    let result = sqlx::query(
        "INSERT INTO usuarios (username, password_hash, nombre, correo) VALUES ($1, $2, $3, $4)",
    )
    .bind(&payload.username)
    .bind(&password_hash)
    .bind(&payload.nombre)
    .bind(&payload.correo)
    .execute(&pool)
    .await;

    match result {
        Ok(_) => Ok(Json(RegisterResponse { message: "Usuario registrado".into() })),
        Err(e) => {
            if let Some(db_err) = e.as_database_error() {
                if db_err.code().map(|code| code == "23505").unwrap_or(false) {
                    return Err((
                        StatusCode::CONFLICT,
                        json!({"success": false, "message": "Username ya ocupado"}).to_string(),
                    ));
                }
            }
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"success": false, "message": format!("Database error: {e}")}).to_string(),
            ))
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

/// Cambia la contraseña del usuario autenticado, previa verificación de la
/// actual.
#[utoipa::path(
    post,
    path = "/auth/change_password",
    tag = "Authentication",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Contraseña actualizada"),
        (status = 401, description = "Contraseña actual incorrecta"),
        (status = 404, description = "Usuario inexistente"),
        (status = 500, description = "Error interno")
    ),
    security(("bearerAuth" = []))
)]
pub async fn change_password(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<ApiResponse<()>, WorkflowError> {
    let id_usuario = claims.user_id()?;

    let actual: Option<String> =
        sqlx::query_scalar("SELECT password_hash FROM usuarios WHERE id_usuario = $1")
            .bind(id_usuario)
            .fetch_optional(&pool)
            .await?;
    let actual = actual.ok_or(WorkflowError::NotFound)?;

    let coincide = verify(&payload.old_password, &actual).map_err(|e| {
        WorkflowError::Validation(format!("No se pudo verificar la contraseña: {e}"))
    })?;
    if !coincide {
        return Err(WorkflowError::PermissionDenied(
            "La contraseña actual no coincide".into(),
        ));
    }

    let nuevo_hash = hash(&payload.new_password, DEFAULT_COST).map_err(|e| {
        WorkflowError::Validation(format!("No se pudo derivar la contraseña: {e}"))
    })?;
    sqlx::query("UPDATE usuarios SET password_hash = $1 WHERE id_usuario = $2")
        .bind(&nuevo_hash)
        .bind(id_usuario)
        .execute(&pool)
        .await?;

    Ok(ApiResponse::success(StatusCode::OK, "Contraseña actualizada", ()))
}

/// Rutas públicas: sin token.
pub fn auth_routes() -> Router<PgPool> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/register", post(register))
}

/// Rutas de cuenta que sí exigen un token vigente.
pub fn auth_private_routes() -> Router<PgPool> {
    Router::new().route("/auth/change_password", post(change_password))
}

use utoipa::OpenApi;
#[derive(OpenApi)]
#[openapi(
    paths(login, register, change_password),
    components(schemas(LoginRequest, LoginResponse, RegisterRequest, RegisterResponse, ChangePasswordRequest)),
    tags(
        (name = "Authentication", description = "Login, registro y cambio de contraseña")
    )
)]
pub struct AuthDoc;
