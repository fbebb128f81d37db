//! JWT bearer authentication
//!
//! Tokens are issued elsewhere; this module only verifies them and injects
//! the authenticated user into request extensions. Admin-only routes are
//! gated by a second middleware layer.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::core_types::UserId;
use crate::gateway::state::AppState;
use crate::gateway::types::ErrorBody;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: UserId,
    pub role: String,
    pub exp: usize,
}

/// Authenticated caller, injected into request extensions.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: UserId,
    pub role: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

pub fn verify_token(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

type AuthRejection = (StatusCode, Json<ErrorBody>);

fn unauthorized(msg: &str) -> AuthRejection {
    (StatusCode::UNAUTHORIZED, Json(ErrorBody::new(msg)))
}

/// Verify the Authorization bearer token and attach [`AuthUser`].
pub async fn jwt_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AuthRejection> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| unauthorized("Missing Authorization header"))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| unauthorized("Invalid token format"))?;

    match verify_token(&state.jwt_secret, token) {
        Ok(claims) => {
            request.extensions_mut().insert(AuthUser {
                user_id: claims.sub,
                role: claims.role,
            });
            Ok(next.run(request).await)
        }
        Err(_) => Err(unauthorized("Invalid or expired token")),
    }
}

/// Reject non-admin callers. Must run after [`jwt_auth_middleware`].
pub async fn admin_guard(
    request: Request<Body>,
    next: Next,
) -> Result<Response, AuthRejection> {
    let is_admin = request
        .extensions()
        .get::<AuthUser>()
        .map(|u| u.is_admin())
        .unwrap_or(false);
    if !is_admin {
        return Err((
            StatusCode::FORBIDDEN,
            Json(ErrorBody::new("Admin privileges required")),
        ));
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn issue(secret: &str, sub: UserId, role: &str, exp_offset: i64) -> String {
        let claims = Claims {
            sub,
            role: role.to_string(),
            exp: (chrono::Utc::now().timestamp() + exp_offset) as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_verify_round_trip() {
        let token = issue("secret", 42, "user", 3600);
        let claims = verify_token("secret", &token).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.role, "user");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issue("secret", 42, "user", 3600);
        assert!(verify_token("other", &token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = issue("secret", 42, "user", -3600);
        assert!(verify_token("secret", &token).is_err());
    }

    #[test]
    fn test_admin_flag() {
        assert!(AuthUser {
            user_id: 1,
            role: "admin".into()
        }
        .is_admin());
        assert!(!AuthUser {
            user_id: 1,
            role: "user".into()
        }
        .is_admin());
    }
}
