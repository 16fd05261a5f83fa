use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use parlor_types::api::Claims;

use crate::error::ApiError;
use crate::state::AppState;

pub const TOKEN_COOKIE: &str = "token";

/// Extract and validate the JWT from the Authorization header or the token cookie.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = token_from_request(req.headers(), &jar)
        .ok_or_else(|| ApiError::unauthorized("Unauthorized"))?;

    let claims = decode_token(&state.jwt_secret, &token)
        .ok_or_else(|| ApiError::unauthorized("Invalid token"))?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Bearer header wins over the cookie.
pub fn token_from_request(headers: &HeaderMap, jar: &CookieJar) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    match bearer {
        Some(token) => Some(token.to_string()),
        None => jar.get(TOKEN_COOKIE).map(|c| c.value().to_string()),
    }
}

pub fn decode_token(secret: &str, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}

pub fn create_token(secret: &str, user_id: Uuid, email: &str, ttl_days: i64) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(ttl_days)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn session_cookie(token: &str, ttl_days: i64) -> String {
    format!(
        "{}={}; HttpOnly; Secure; SameSite=Strict; Path=/; Max-Age={}",
        TOKEN_COOKIE,
        token,
        ttl_days * 24 * 60 * 60
    )
}

pub fn cleared_cookie() -> String {
    format!("{}=; HttpOnly; Secure; SameSite=Strict; Path=/; Max-Age=0", TOKEN_COOKIE)
}
