//! Broadcaster token issuance.
//!
//! The relay core only verifies capability tokens; this endpoint is
//! where they come from. A broadcaster presents the shared password and
//! receives a signed HS256 token it then attaches to its registration
//! heartbeats.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use lingocast_relay::BroadcastClaims;

use super::AppState;

/// Token lifetime; broadcasters re-authenticate daily.
const TOKEN_TTL_HOURS: i64 = 24;

/// Issues broadcaster capability tokens signed with the shared secret.
pub struct TokenIssuer {
    encoding: EncodingKey,
}

impl TokenIssuer {
    /// Create an issuer for the given shared secret.
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Mint a token valid for [`TOKEN_TTL_HOURS`].
    pub fn issue(&self) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = BroadcastClaims {
            iat: now.timestamp(),
            exp: (now + Duration::hours(TOKEN_TTL_HOURS)).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding)
    }
}

#[derive(Debug, Deserialize)]
pub struct AuthRequest {
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
}

/// POST /auth
///
/// Exchange the broadcaster password for a capability token.
pub async fn issue_token_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AuthRequest>,
) -> Response {
    if request.password != state.password {
        warn!("Rejected token request with wrong password");
        return (StatusCode::UNAUTHORIZED, "invalid password").into_response();
    }

    match state.issuer.issue() {
        Ok(token) => {
            info!("Issued broadcaster token");
            Json(AuthResponse { token }).into_response()
        }
        Err(e) => {
            warn!(error = %e, "Failed to sign token");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
