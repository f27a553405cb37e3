use crate::server::{
    MessageResponse, ServerRouter, ServerState, auth::AuthenticatedUser, extract::Json,
};
use axum::{middleware, routing::get};
use serde::Serialize;

mod comments;
mod posts;
mod topics;
mod users;

pub fn routes(state: &ServerState) -> ServerRouter {
    // Sessions are checked before any other extractor runs.
    let require_session =
        middleware::from_extractor_with_state::<AuthenticatedUser, _>(state.clone());
    let protected = ServerRouter::new()
        .merge(users::protected_routes())
        .merge(topics::routes())
        .merge(posts::routes())
        .merge(comments::routes())
        .route_layer(require_session);

    ServerRouter::new()
        .route("/", get(index))
        .route("/healthz", get(health))
        .merge(users::public_routes())
        .merge(protected)
}

async fn index() -> Json<MessageResponse> {
    Json(MessageResponse::new("Welcome to the Agora forum API"))
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct Health {
    pub status: &'static str,
}

async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}
