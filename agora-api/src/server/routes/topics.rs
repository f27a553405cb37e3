use crate::server::{
    MessageResponse, Result, ServerError, ServerRouter, auth::AuthenticatedUser, extract::Json,
    require_creator,
};
use agora_common::model::{
    Id,
    topic::{CreateTopic, Topic, TopicMarker},
};
use agora_db::client::{DbClient, DbError};
use axum::{extract::State, http::StatusCode, routing::get};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .route("/api/topics", get(list_topics).post(create_topic))
        .typed_get(get_topic)
        .typed_delete(delete_topic)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/topics/{id}", rejection(ServerError))]
struct TopicPath {
    id: Id<TopicMarker>,
}

async fn list_topics(
    _: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<Vec<Topic>>> {
    Ok(Json(db.fetch_topics().await?))
}

async fn create_topic(
    user: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
    Json(topic): Json<CreateTopic>,
) -> Result<(StatusCode, Json<Topic>)> {
    let topic = db
        .create_topic(&topic, user.user.id)
        .await
        .map_err(|err| match err {
            DbError::UniqueViolation { .. } => ServerError::TopicTitleTaken,
            err => err.into(),
        })?;
    info!(topic = %topic.id, user = %user.user.id, "Created topic");

    Ok((StatusCode::CREATED, Json(topic)))
}

async fn get_topic(
    TopicPath { id }: TopicPath,
    _: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<Topic>> {
    let topic = db
        .fetch_topic(id)
        .await?
        .ok_or(ServerError::TopicByIdNotFound(id))?;

    Ok(Json(topic))
}

async fn delete_topic(
    TopicPath { id }: TopicPath,
    user: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<MessageResponse>> {
    let outcome = db.delete_topic(id, user.user.id).await?;
    require_creator(
        outcome,
        ServerError::TopicByIdNotFound(id),
        ServerError::NotTopicCreator(id),
    )?;
    info!(topic = %id, "Deleted topic");

    Ok(Json(MessageResponse::new("Topic deleted successfully")))
}
