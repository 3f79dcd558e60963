use async_trait::async_trait;
use axum::{
    body::Body,
    extract::Request,
    http::header,
    response::IntoResponse,
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::AppError;
use crate::middleware::gate::{Flow, Gate};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
}

/// Caller identity, inserted into request extensions by `AuthGate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
}

/// Verifies HS256 bearer tokens.
pub struct AuthGate {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl AuthGate {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Mints a token for `subject` valid for `ttl`.
    pub fn issue_token(&self, subject: &str, ttl: Duration) -> Result<String, AppError> {
        let now = chrono::Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: subject.to_string(),
            iat: now,
            exp: now + ttl.as_secs() as usize,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::warn!("JWT decode error: {}", e);
                AppError::Unauthorized("Invalid token".to_string())
            })
    }

    fn authenticate(&self, req: &Request<Body>) -> Result<AuthUser, AppError> {
        let token = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(bearer_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Missing authorization header".to_string()))?;

        let claims = self.verify(token)?;
        Ok(AuthUser { id: claims.sub })
    }
}

/// Token from an `Authorization` value; the scheme name is case-insensitive.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim_start().split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
}

#[async_trait]
impl Gate for AuthGate {
    fn name(&self) -> &'static str {
        "authenticate"
    }

    async fn check(&self, req: &mut Request<Body>) -> Flow {
        match self.authenticate(req) {
            Ok(user) => {
                req.extensions_mut().insert(user);
                Flow::Continue
            }
            Err(e) => Flow::Halt(e.into_response()),
        }
    }
}
