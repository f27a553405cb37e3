use crate::server::{
    CookieSettings, MessageResponse, Result, ServerError, ServerRouter, auth::AuthenticatedUser,
    extract::Json,
};
use agora_common::model::{
    Id,
    auth::{Credentials, PasswordHash, SESSION_COOKIE_NAME, SessionKeys},
    user::{Login, SignUp, User, UserMarker, Username},
};
use agora_db::client::{DbClient, DbError};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

pub fn public_routes() -> ServerRouter {
    ServerRouter::new()
        .route("/api/users/signup", post(sign_up))
        .route("/api/users/login", post(log_in))
}

pub fn protected_routes() -> ServerRouter {
    ServerRouter::new()
        .route("/api/users/validate", get(validate))
        .route("/api/users/logout", post(log_out))
}

/// The part of a user that is shown to clients.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct UserView {
    pub id: Id<UserMarker>,
    pub username: Username,
}

impl From<User> for UserView {
    fn from(value: User) -> Self {
        Self {
            id: value.id,
            username: value.username,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct LoginResponse {
    pub message: String,
    pub user: UserView,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct ValidateResponse {
    pub user: UserView,
}

async fn sign_up(
    State(db): State<Arc<DbClient>>,
    Json(sign_up): Json<SignUp>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    let password_hash = PasswordHash::generate(&sign_up.password)?;

    let user = db
        .create_user(&sign_up.username, &password_hash)
        .await
        .map_err(|err| match err {
            DbError::UniqueViolation { .. } => ServerError::UsernameTaken,
            err => err.into(),
        })?;
    info!(user = %user.id, "Signed up new user");

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("User created successfully")),
    ))
}

async fn log_in(
    State(db): State<Arc<DbClient>>,
    State(session_keys): State<Arc<SessionKeys>>,
    State(cookie_settings): State<CookieSettings>,
    jar: CookieJar,
    Json(login): Json<Login>,
) -> Result<(CookieJar, Json<LoginResponse>)> {
    let credentials = db.fetch_credentials(&login.username).await?;
    let user = Credentials::authenticate(credentials, &login.password)
        .ok_or(ServerError::InvalidCredentials)?;

    let session = session_keys
        .issue(user.id)
        .map_err(ServerError::SessionIssue)?;

    let cookie = Cookie::build((SESSION_COOKIE_NAME, session.token))
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(cookie_settings.secure)
        .path("/")
        .max_age(session_keys.lifetime().get())
        .expires(session.expires_at);

    let response = LoginResponse {
        message: "Login successful".to_owned(),
        user: user.into(),
    };

    Ok((jar.add(cookie), Json(response)))
}

async fn validate(AuthenticatedUser { user }: AuthenticatedUser) -> Json<ValidateResponse> {
    Json(ValidateResponse { user: user.into() })
}

async fn log_out(_: AuthenticatedUser, jar: CookieJar) -> (CookieJar, Json<MessageResponse>) {
    let removal = Cookie::build(SESSION_COOKIE_NAME).path("/");

    (
        jar.remove(removal),
        Json(MessageResponse::new("Logged out successfully")),
    )
}
