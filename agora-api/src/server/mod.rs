use agora_common::model::{
    Id,
    auth::{PasswordHashingError, SessionError},
    comment::CommentMarker,
    post::PostMarker,
    topic::TopicMarker,
    user::UserMarker,
};
use agora_db::client::{DbClient, DbError, OwnedMutation};
use axum::{
    Router,
    extract::{
        FromRef, Request,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use extract::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

pub use agora_common::model::auth::SessionKeys;

pub mod auth;
pub mod extract;
mod routes;

pub type ServerRouter = Router<ServerState>;

#[derive(Clone, Debug, FromRef)]
pub struct ServerState {
    pub db_client: Arc<DbClient>,
    pub session_keys: Arc<SessionKeys>,
    pub cookie_settings: CookieSettings,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct CookieSettings {
    /// Restricts the session cookie to HTTPS.
    pub secure: bool,
}

pub fn routes(state: &ServerState) -> ServerRouter {
    routes::routes(state).fallback(fallback)
}

/// The complete service: all routes with request tracing, bound to `state`.
pub fn app(state: ServerState) -> Router {
    routes(&state)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Query rejected: {0}")]
    QueryRejection(#[from] QueryRejection),
    #[error("Incoming JSON rejected: {0}")]
    JsonRejection(#[from] JsonRejection),
    #[error("JSON response could not be serialized: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error("The session cookie was missing")]
    MissingSessionCookie,
    #[error("The session token was invalid: {0}")]
    InvalidSession(SessionError),
    #[error("The session belongs to user {0}, who does not exist")]
    SessionUserNotFound(Id<UserMarker>),
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("The session token could not be issued: {0}")]
    SessionIssue(SessionError),
    #[error(transparent)]
    PasswordHashing(#[from] PasswordHashingError),
    #[error("Username already exists")]
    UsernameTaken,
    #[error("Topic already exists")]
    TopicTitleTaken,
    #[error(transparent)]
    Database(#[from] DbError),
    #[error("Topic with id {0} was not found")]
    TopicByIdNotFound(Id<TopicMarker>),
    #[error("Post with id {0} was not found")]
    PostByIdNotFound(Id<PostMarker>),
    #[error("Comment with id {0} was not found")]
    CommentByIdNotFound(Id<CommentMarker>),
    #[error("You can only delete topics created by you")]
    NotTopicCreator(Id<TopicMarker>),
    #[error("You can only modify posts created by you")]
    NotPostCreator(Id<PostMarker>),
    #[error("You can only modify comments created by you")]
    NotCommentCreator(Id<CommentMarker>),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_)
            | ServerError::TopicByIdNotFound(_)
            | ServerError::PostByIdNotFound(_)
            | ServerError::CommentByIdNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::PathRejection(_)
            | ServerError::QueryRejection(_)
            | ServerError::JsonRejection(_) => StatusCode::BAD_REQUEST,
            ServerError::MissingSessionCookie
            | ServerError::InvalidSession(_)
            | ServerError::SessionUserNotFound(_)
            | ServerError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ServerError::NotTopicCreator(_)
            | ServerError::NotPostCreator(_)
            | ServerError::NotCommentCreator(_) => StatusCode::FORBIDDEN,
            ServerError::UsernameTaken
            | ServerError::TopicTitleTaken
            | ServerError::Database(DbError::UniqueViolation { .. }) => StatusCode::CONFLICT,
            ServerError::JsonResponse(_)
            | ServerError::SessionIssue(_)
            | ServerError::PasswordHashing(_)
            | ServerError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message sent to the client. Session failures and server faults are not
    /// explained further.
    pub fn public_message(&self) -> String {
        match self.status() {
            StatusCode::UNAUTHORIZED if !matches!(self, ServerError::InvalidCredentials) => {
                "Unauthorized".to_owned()
            }
            StatusCode::CONFLICT if matches!(self, ServerError::Database(_)) => {
                "Resource already exists".to_owned()
            }
            status if status.is_server_error() => "Internal server error".to_owned(),
            _ => self.to_string(),
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!(error = %self, %status, "Replying with error");
        } else {
            debug!(error = %self, %status, "Replying with error");
        }

        let error_response = ErrorResponse {
            error: self.public_message(),
        };
        (status, Json(error_response)).into_response()
    }
}

/// Turns the outcome of a creator-only mutation into the matching error.
pub(crate) fn require_creator(
    outcome: OwnedMutation,
    not_found: ServerError,
    not_creator: ServerError,
) -> Result<()> {
    match outcome {
        OwnedMutation::Applied => Ok(()),
        OwnedMutation::NotFound => Err(not_found),
        OwnedMutation::NotOwner => Err(not_creator),
    }
}
