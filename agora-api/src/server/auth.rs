use crate::server::ServerError;
use agora_common::model::{
    auth::{SESSION_COOKIE_NAME, SessionKeys},
    user::User,
};
use agora_db::client::DbClient;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;

/// The user owning the session cookie of the request.
///
/// Rejects with 401 when the cookie is missing, the token does not verify, or
/// the user it names no longer exists. The first successful extraction is
/// cached in the request extensions, so the route layer guarding protected
/// routes and the handler share one lookup.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct AuthenticatedUser {
    pub user: User,
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<DbClient>: FromRef<S>,
    Arc<SessionKeys>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(authenticated) = parts.extensions.get::<Self>() {
            return Ok(authenticated.clone());
        }

        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(SESSION_COOKIE_NAME)
            .map(|cookie| cookie.value().to_owned())
            .filter(|token| !token.is_empty())
            .ok_or(ServerError::MissingSessionCookie)?;

        let user_id = Arc::<SessionKeys>::from_ref(state)
            .verify(&token)
            .map_err(ServerError::InvalidSession)?;

        let user = Arc::<DbClient>::from_ref(state)
            .fetch_user(user_id)
            .await?
            .ok_or(ServerError::SessionUserNotFound(user_id))?;

        let authenticated = Self { user };
        parts.extensions.insert(authenticated.clone());
        Ok(authenticated)
    }
}
