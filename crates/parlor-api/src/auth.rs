use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use axum_extra::extract::{CookieJar, WithRejection};
use tracing::info;
use uuid::Uuid;

use parlor_types::api::{AuthRequest, AuthResponse, StatusResponse};

use crate::convert;
use crate::error::{ApiError, ApiResult};
use crate::middleware::{cleared_cookie, create_token, decode_token, session_cookie, token_from_request};
use crate::state::{AppState, with_db};

const MIN_PASSWORD_LEN: usize = 8;

/// `POST /auth`: register, login or logout depending on `action`.
pub async fn auth(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    WithRejection(Json(req), _): WithRejection<Json<AuthRequest>, ApiError>,
) -> ApiResult<Response> {
    match req {
        AuthRequest::Register {
            email,
            password,
            name,
            avatar,
        } => register(state, email, password, name, avatar).await,
        AuthRequest::Login { email, password } => login(state, email, password).await,
        AuthRequest::Logout => logout(state, &headers, &jar).await,
    }
}

async fn register(
    state: AppState,
    email: String,
    password: String,
    name: String,
    avatar: Option<String>,
) -> ApiResult<Response> {
    let email = email.trim().to_lowercase();
    let name = name.trim().to_string();

    // Validate input
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::bad_request("A valid email is required"));
    }
    if name.is_empty() {
        return Err(ApiError::bad_request("Name is required"));
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {}", e)))?
        .to_string();

    let user_id = Uuid::new_v4();
    let row = with_db(&state, {
        let email = email.clone();
        move |db| {
            if db.get_user_by_email(&email)?.is_some() {
                return Err(ApiError::conflict("Email already registered"));
            }
            let id = user_id.to_string();
            db.create_user(&id, &email, &password_hash, &name, avatar.as_deref())?;
            db.get_user_by_id(&id)?
                .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("user vanished after insert")))
        }
    })
    .await?;

    let token = create_token(&state.jwt_secret, user_id, &email, state.token_ttl_days)?;
    info!("Registered user {}", user_id);

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, session_cookie(&token, state.token_ttl_days))],
        Json(AuthResponse {
            user: convert::user(row, true),
            token,
        }),
    )
        .into_response())
}

async fn login(state: AppState, email: String, password: String) -> ApiResult<Response> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || password.is_empty() {
        return Err(ApiError::bad_request("Email and password are required"));
    }

    let user = with_db(&state, move |db| Ok(db.get_user_by_email(&email)?))
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid email or password"))?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("stored hash unreadable: {}", e)))?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::unauthorized("Invalid email or password"))?;

    let user_id = convert::parse_uuid(&user.id, "user id");
    let token = create_token(&state.jwt_secret, user_id, &user.email, state.token_ttl_days)?;

    let row = with_db(&state, move |db| {
        db.set_online(&user.id, true)?;
        Ok(db.get_user_by_id(&user.id)?.unwrap_or(user))
    })
    .await?;

    Ok((
        [(header::SET_COOKIE, session_cookie(&token, state.token_ttl_days))],
        Json(AuthResponse {
            user: convert::user(row, true),
            token,
        }),
    )
        .into_response())
}

/// Always succeeds; the presence flag is only touched when the token is valid.
async fn logout(state: AppState, headers: &HeaderMap, jar: &CookieJar) -> ApiResult<Response> {
    let claims = token_from_request(headers, jar).and_then(|t| decode_token(&state.jwt_secret, &t));

    if let Some(claims) = claims {
        let id = claims.sub.to_string();
        with_db(&state, move |db| Ok(db.set_online(&id, false)?)).await?;
        info!("User {} logged out", claims.sub);
    }

    Ok((
        [(header::SET_COOKIE, cleared_cookie())],
        Json(StatusResponse {
            success: true,
            message: "Logged out".into(),
        }),
    )
        .into_response())
}
