use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use futures_util::future::{ready, FutureExt, LocalBoxFuture};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::models::Id;
use crate::repo::{RepoError, UserRepo};
use crate::routes::AppState;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Consumer,
    Provider,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Consumer => "consumer",
            Role::Provider => "provider",
            Role::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub role: Role,
}

/// Validate a JWT and return its claims.
pub fn decode_jwt(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;
    Ok(data.claims)
}

/// Create a signed token for a user.
pub fn create_jwt(
    secret: &str,
    user_id: Id,
    role: Role,
    ttl_hours: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let expiration = (chrono::Utc::now() + chrono::Duration::hours(ttl_hours)).timestamp() as usize;
    let claims = Claims { sub: user_id.to_string(), exp: expiration, role };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// The authenticated caller of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Id,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Id, role: Role) -> Self { Self { id, role } }
    pub fn is_admin(&self) -> bool { self.role == Role::Admin }
}

/// Extractor yielding the validated caller.
pub struct Auth(pub Actor);

impl Auth {
    pub fn actor(&self) -> Actor { self.0 }
}

impl FromRequest for Auth {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, ApiError>>;

    /// Validates the bearer token, then re-reads the account so a deactivated
    /// user is locked out before the token expires.
    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        let Some(state) = req.app_data::<web::Data<AppState>>().cloned() else {
            tracing::error!("AppState missing from app data");
            return ready(Err(ApiError::Internal)).boxed_local();
        };
        // Delegate to BearerAuth to parse the header.
        let Ok(bearer) = BearerAuth::from_request(req, pl).into_inner() else {
            return ready(Err(ApiError::Unauthorized("Authorization required".into()))).boxed_local();
        };
        let Some(id) = decode_jwt(&state.config.jwt_secret, bearer.token())
            .ok()
            .and_then(|claims| claims.sub.parse::<Id>().ok())
        else {
            return ready(Err(ApiError::Unauthorized("Invalid token".into()))).boxed_local();
        };
        async move {
            let user = match state.repo.get_user(id).await {
                Ok(user) => user,
                Err(RepoError::NotFound) => return Err(ApiError::Unauthorized("Invalid token".into())),
                Err(e) => return Err(e.into()),
            };
            if !user.is_active {
                tracing::debug!(user = %id, "token of deactivated account refused");
                return Err(ApiError::Forbidden("Account is deactivated".into()));
            }
            Ok(Auth(Actor::new(user.id, user.role)))
        }
        .boxed_local()
    }
}

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| {
            tracing::error!("password hashing failed: {e}");
            ApiError::Internal
        })
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(e) => {
            tracing::error!("stored password hash is unreadable: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit-test-secret-that-is-32-bytes!!";

    #[test]
    fn jwt_roundtrip_keeps_subject_and_role() {
        let id = Id::new_v4();
        let token = create_jwt(SECRET, id, Role::Provider, 1).unwrap();
        let claims = decode_jwt(SECRET, &token).unwrap();
        assert_eq!(claims.sub, id.to_string());
        assert_eq!(claims.role, Role::Provider);
    }

    #[test]
    fn jwt_with_other_secret_is_rejected() {
        let token = create_jwt(SECRET, Id::new_v4(), Role::Consumer, 1).unwrap();
        assert!(decode_jwt("another-secret-another-secret-1234", &token).is_err());
    }

    #[test]
    fn expired_jwt_is_rejected() {
        let token = create_jwt(SECRET, Id::new_v4(), Role::Consumer, -2).unwrap();
        assert!(decode_jwt(SECRET, &token).is_err());
    }

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("anything", "not-a-phc-string"));
    }
}
