use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use folio_catalog::CartOwner;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

pub const CART_SESSION_HEADER: &str = "x-cart-session";
const MAX_SESSION_KEY_LEN: usize = 64;

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CustomerClaims {
    pub sub: String,
    pub email: Option<String>,
    pub role: String,
    pub exp: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StaffClaims {
    pub sub: String,
    pub email: Option<String>,
    pub role: String,
    pub exp: usize,
}

/// Who is shopping: the cart owner plus any anonymous cart key presented alongside a login
#[derive(Debug, Clone)]
pub struct CartIdentity {
    pub owner: CartOwner,
    pub anonymous_key: Option<String>,
}

impl CartIdentity {
    pub fn user_id(&self) -> Option<Uuid> {
        self.owner.user_id()
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

fn session_key(headers: &HeaderMap) -> Result<Option<String>, AppError> {
    let Some(value) = headers.get(CART_SESSION_HEADER) else {
        return Ok(None);
    };
    let key = value
        .to_str()
        .map_err(|_| AppError::AuthenticationError("Malformed cart session".to_string()))?
        .trim();
    if key.is_empty() || key.len() > MAX_SESSION_KEY_LEN {
        return Err(AppError::AuthenticationError("Malformed cart session".to_string()));
    }
    Ok(Some(key.to_string()))
}

// ============================================================================
// Customer Identity Middleware
// ============================================================================

pub async fn cart_identity_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let session = session_key(req.headers())?;

    let identity = match bearer_token(req.headers()) {
        Some(token) => {
            let token_data = decode::<CustomerClaims>(
                token,
                &DecodingKey::from_secret(state.auth.secret.as_bytes()),
                &Validation::default(),
            )
            .map_err(|_| AppError::AuthenticationError("Invalid token".to_string()))?;

            if token_data.claims.role != "CUSTOMER" {
                return Err(AppError::AuthorizationError("Customer role required".to_string()));
            }
            let user_id = Uuid::parse_str(&token_data.claims.sub)
                .map_err(|_| AppError::AuthenticationError("Invalid subject".to_string()))?;

            req.extensions_mut().insert(token_data.claims);
            CartIdentity {
                owner: CartOwner::Authenticated(user_id),
                anonymous_key: session,
            }
        }
        None => {
            let key = session.ok_or_else(|| {
                AppError::AuthenticationError("Bearer token or cart session required".to_string())
            })?;
            CartIdentity {
                owner: CartOwner::Anonymous(key),
                anonymous_key: None,
            }
        }
    };

    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}

// ============================================================================
// Staff Authentication Middleware
// ============================================================================

pub async fn staff_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(req.headers())
        .ok_or_else(|| AppError::AuthenticationError("Bearer token required".to_string()))?;

    let token_data = decode::<StaffClaims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthenticationError("Invalid token".to_string()))?;

    if token_data.claims.role != "STAFF" && token_data.claims.role != "ADMIN" {
        return Err(AppError::AuthorizationError("Staff role required".to_string()));
    }

    req.extensions_mut().insert(token_data.claims);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_session_key_bounds() {
        let mut headers = HeaderMap::new();
        assert!(session_key(&headers).unwrap().is_none());

        headers.insert(CART_SESSION_HEADER, HeaderValue::from_static(" abc "));
        assert_eq!(session_key(&headers).unwrap().as_deref(), Some("abc"));

        headers.insert(CART_SESSION_HEADER, HeaderValue::from_str(&"k".repeat(65)).unwrap());
        assert!(session_key(&headers).is_err());
    }

    #[test]
    fn test_bearer_prefix_required() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&headers).is_none());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));
    }
}
