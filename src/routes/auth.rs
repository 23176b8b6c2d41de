use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::auth::{create_jwt, hash_password, verify_password, Auth, Role};
use crate::error::{ApiError, RepoResultExt};
use crate::models::{Id, ProviderProfile, PublicUser, User};
use crate::repo::RepoError;
use crate::response::{created, ok};
use crate::routes::{limited, AppState};

pub const MIN_PASSWORD_LEN: usize = 8;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/auth/register").route(web::post().to(register)))
        .service(web::resource("/auth/login").route(web::post().to(login)))
        .service(web::resource("/auth/me").route(web::get().to(me)));
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub phone: Option<String>,
    /// Must match `ADMIN_REGISTRATION_KEY` when registering an admin.
    pub admin_key: Option<String>,
    pub provider_profile: Option<ProviderProfile>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user: PublicUser,
}

fn validate_registration(r: &RegisterRequest) -> Result<(), ApiError> {
    if r.name.trim().is_empty() {
        return Err(ApiError::bad_request("Name is required"));
    }
    if !r.email.contains('@') {
        return Err(ApiError::bad_request("A valid email is required"));
    }
    if r.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!("Password must be at least {MIN_PASSWORD_LEN} characters")));
    }
    Ok(())
}

fn issue_token(data: &AppState, user: &User) -> Result<String, ApiError> {
    create_jwt(&data.config.jwt_secret, user.id, user.role, data.config.jwt_ttl_hours).map_err(|e| {
        tracing::error!("token signing failed: {e}");
        ApiError::Internal
    })
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid input or email already registered"),
        (status = 403, description = "Admin registration refused")
    )
)]
pub async fn register(data: web::Data<AppState>, payload: web::Json<RegisterRequest>) -> Result<HttpResponse, ApiError> {
    let req = payload.into_inner();
    validate_registration(&req)?;
    if req.role == Role::Admin {
        let expected = data.config.admin_registration_key.as_deref();
        if expected.is_none() || req.admin_key.as_deref() != expected {
            warn!(email = %req.email, "admin registration refused");
            return Err(ApiError::Forbidden("Admin registration is not allowed".into()));
        }
    }
    let now = Utc::now();
    let provider_profile = match req.role {
        Role::Provider => Some(ProviderProfile { is_verified: false, ..req.provider_profile.unwrap_or_default() }),
        _ => None,
    };
    let user = User {
        id: Id::new_v4(),
        name: req.name.trim().to_string(),
        email: req.email.trim().to_lowercase(),
        password_hash: hash_password(&req.password)?,
        role: req.role,
        phone: req.phone,
        is_active: true,
        provider_profile,
        created_at: now,
        updated_at: now,
        version: 0,
    };
    let user = match data.repo.create_user(user).await {
        Ok(u) => u,
        Err(RepoError::Conflict) => return Err(ApiError::bad_request("Email already registered")),
        Err(e) => return Err(e.into()),
    };
    info!(user = %user.id, role = user.role.as_str(), "user registered");
    let token = issue_token(&data, &user)?;
    Ok(created("User registered successfully", AuthResponse { token, user: PublicUser::from(&user) }))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account is deactivated"),
        (status = 429, description = "Too many attempts")
    )
)]
pub async fn login(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let ip = req.connection_info().realip_remote_addr().unwrap_or("unknown").to_string();
    limited(data.rate_limiter.allow_login(&ip), "login")?;

    let creds = payload.into_inner();
    let invalid = || ApiError::Unauthorized("Invalid credentials".into());
    let user = match data.repo.find_user_by_email(&creds.email.trim().to_lowercase()).await {
        Ok(u) => u,
        Err(RepoError::NotFound) => return Err(invalid()),
        Err(e) => return Err(e.into()),
    };
    if !verify_password(&creds.password, &user.password_hash) {
        warn!(user = %user.id, "failed login");
        return Err(invalid());
    }
    if !user.is_active {
        return Err(ApiError::Forbidden("Account is deactivated".into()));
    }
    let token = issue_token(&data, &user)?;
    Ok(ok(AuthResponse { token, user: PublicUser::from(&user) }))
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current user", body = PublicUser),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn me(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let user = data.repo.get_user(auth.0.id).await.or_not_found("User")?;
    Ok(ok(PublicUser::from(&user)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str, email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            name: name.into(),
            email: email.into(),
            password: password.into(),
            role: Role::Consumer,
            phone: None,
            admin_key: None,
            provider_profile: None,
        }
    }

    #[test]
    fn registration_input_rules() {
        assert!(validate_registration(&request("Ann", "ann@example.com", "longenough")).is_ok());
        assert!(validate_registration(&request(" ", "ann@example.com", "longenough")).is_err());
        assert!(validate_registration(&request("Ann", "ann.example.com", "longenough")).is_err());
        assert!(validate_registration(&request("Ann", "ann@example.com", "short")).is_err());
    }
}
