use axum::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::Json;
use chrono::{Duration, Utc};
use diesel::prelude::*;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::db;
use crate::error::ApiError;
use crate::models::{NewUser, User};
use crate::schema::users;
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub exp: usize,
}

/// Identity attached to a request once its bearer token checks out.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
}

pub fn create_token(user: &User, jwt_secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let expiration = Utc::now() + Duration::hours(24);
    let claims = Claims {
        sub: user.id.to_string(),
        username: user.username.clone(),
        exp: expiration.timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
}

pub fn validate_token(token: &str, jwt_secret: &str) -> Result<AuthUser, ApiError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthorized("invalid or expired token"))?;
    let id = Uuid::parse_str(&token_data.claims.sub)
        .map_err(|_| ApiError::Unauthorized("invalid token subject"))?;
    Ok(AuthUser {
        id,
        username: token_data.claims.username,
    })
}

/// Bearer-token extractor for write endpoints; reads stay public.
#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(ApiError::Unauthorized("missing Authorization header"))?;
        let value = header
            .to_str()
            .map_err(|_| ApiError::Unauthorized("invalid Authorization header"))?;
        let token = value
            .strip_prefix("Bearer ")
            .ok_or(ApiError::Unauthorized("invalid Authorization header format"))?;
        validate_token(token, &state.config.jwt_secret)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 150))]
    pub username: String,
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user_id: Uuid,
    pub username: String,
}

/// Upserts the user row keyed by username and issues a fresh token.
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    payload.validate()?;
    let mut conn = db::connect(&state.config.database_url)?;

    let new_user = NewUser {
        id: Uuid::new_v4(),
        username: payload.username.clone(),
        email: payload.email.clone(),
        created_at: Utc::now().naive_utc(),
    };
    let user: User = diesel::insert_into(users::table)
        .values(&new_user)
        .on_conflict(users::username)
        .do_update()
        .set(users::email.eq(&payload.email))
        .returning(User::as_returning())
        .get_result(&mut conn)?;

    let token = create_token(&user, &state.config.jwt_secret)?;
    info!("issued token for user {}", user.username);
    Ok(Json(LoginResponse {
        token,
        user_id: user.id,
        username: user.username,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "guest_one".to_string(),
            email: "guest@example.com".to_string(),
            created_at: Utc::now().naive_utc(),
        }
    }

    #[test]
    fn token_round_trip_preserves_identity() {
        let user = sample_user();
        let token = create_token(&user, "test-secret").unwrap();
        let auth = validate_token(&token, "test-secret").unwrap();
        assert_eq!(auth.id, user.id);
        assert_eq!(auth.username, user.username);
    }

    #[test]
    fn token_with_wrong_secret_is_rejected() {
        let user = sample_user();
        let token = create_token(&user, "test-secret").unwrap();
        assert!(validate_token(&token, "other-secret").is_err());
    }

    #[test]
    fn garbage_token_is_rejected() {
        assert!(validate_token("not.a.token", "test-secret").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let user = sample_user();
        let claims = Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            exp: (Utc::now() - Duration::hours(2)).timestamp() as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        assert!(validate_token(&token, "test-secret").is_err());
    }
}
