//! Auth routes: credential sign-up/sign-in, session cookie, caller extractors.

use axum::extract::{FromRef, FromRequestParts, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Json, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use time::Duration;

use super::message;
use crate::model::Profile;
use crate::services::auth::{self as auth_svc, AuthError, Identity, IdentityState, SignUp};
use crate::state::AppState;

pub(crate) const COOKIE_NAME: &str = "session_token";

fn session_token(parts: &Parts) -> Option<String> {
    let jar = CookieJar::from_headers(&parts.headers);
    jar.get(COOKIE_NAME)
        .map(Cookie::value)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
}

fn session_cookie(token: String, secure: bool, max_age: Duration) -> Cookie<'static> {
    Cookie::build((COOKIE_NAME, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(max_age)
        .build()
}

// =============================================================================
// EXTRACTORS
// =============================================================================

/// Resolved caller, whether or not anyone is signed in. Never rejects; views
/// feed it to the route guard.
pub struct Viewer(pub IdentityState);

impl<S> FromRequestParts<S> for Viewer
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let token = session_token(parts);
        Ok(Self(auth_svc::resolve(app_state.store.as_ref(), token.as_deref()).await))
    }
}

/// Authenticated caller extracted from the session cookie.
/// Use as a handler parameter to require authentication.
pub struct AuthUser {
    pub identity: Identity,
    pub token: String,
}

impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Some(token) = session_token(parts) else {
            return Err(StatusCode::UNAUTHORIZED);
        };
        let app_state = AppState::from_ref(state);
        match auth_svc::resolve(app_state.store.as_ref(), Some(&token)).await {
            IdentityState::Authenticated(identity) => Ok(Self { identity, token }),
            IdentityState::Anonymous => Err(StatusCode::UNAUTHORIZED),
            IdentityState::Resolving => Err(StatusCode::SERVICE_UNAVAILABLE),
        }
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

pub(crate) fn auth_error_to_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::AdminSignUpForbidden => StatusCode::FORBIDDEN,
        AuthError::InvalidEmail | AuthError::WeakPassword => StatusCode::BAD_REQUEST,
        AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        AuthError::EmailTaken => StatusCode::CONFLICT,
        AuthError::PasswordHash | AuthError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn auth_failure(err: &AuthError) -> Response {
    let status = auth_error_to_status(err);
    if status.is_server_error() {
        tracing::error!(error = %err, "auth request failed");
    }
    message(status, err.to_string())
}

/// `POST /api/auth/sign-up`: register a seller or buyer.
pub async fn sign_up(State(state): State<AppState>, Json(form): Json<SignUp>) -> Response {
    match auth_svc::sign_up(state.store.as_ref(), form).await {
        Ok(profile) => (StatusCode::CREATED, Json(profile)).into_response(),
        Err(e) => auth_failure(&e),
    }
}

#[derive(Deserialize)]
pub struct SignInRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
pub struct SignInResponse {
    profile: Profile,
    redirect: &'static str,
}

/// `POST /api/auth/sign-in`: verify credentials, set the session cookie.
pub async fn sign_in(State(state): State<AppState>, jar: CookieJar, Json(req): Json<SignInRequest>) -> Response {
    let ttl = state.config.session_ttl;
    match auth_svc::sign_in(state.store.as_ref(), &req.email, &req.password, ttl).await {
        Ok((token, profile)) => {
            let jar = jar.add(session_cookie(token, state.config.cookie_secure, ttl));
            let redirect = auth_svc::landing_route(profile.role);
            (jar, Json(SignInResponse { profile, redirect })).into_response()
        }
        Err(e) => auth_failure(&e),
    }
}

/// `POST /api/auth/sign-out`: delete the session, clear the cookie.
pub async fn sign_out(State(state): State<AppState>, auth: AuthUser) -> impl IntoResponse {
    if let Err(e) = auth_svc::sign_out(state.store.as_ref(), &auth.token).await {
        tracing::warn!(error = %e, user_id = %auth.identity.user_id, "session delete failed");
    }
    let jar = CookieJar::new().add(session_cookie(String::new(), state.config.cookie_secure, Duration::ZERO));
    (jar, StatusCode::NO_CONTENT)
}

/// `GET /api/auth/me`: the current identity.
pub async fn me(auth: AuthUser) -> Json<Identity> {
    Json(auth.identity)
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
