use crate::server::{
    MessageResponse, Result, ServerError, ServerRouter,
    auth::AuthenticatedUser,
    extract::{Json, Query},
    require_creator,
};
use agora_common::model::{
    Id,
    post::{CreatePost, Post, PostMarker, UpdatePost},
    reaction::ReactionRequest,
    topic::TopicMarker,
};
use agora_db::client::{DbClient, DbError};
use axum::{extract::State, http::StatusCode, routing::get};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .route("/api/posts", get(list_posts).post(create_post))
        .typed_get(get_post)
        .typed_put(update_post)
        .typed_delete(delete_post)
        .typed_post(react_to_post)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/posts/{id}", rejection(ServerError))]
struct PostPath {
    id: Id<PostMarker>,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/posts/{id}/react", rejection(ServerError))]
struct ReactToPostPath {
    id: Id<PostMarker>,
}

#[derive(Deserialize)]
struct PostsQuery {
    topic_id: Id<TopicMarker>,
}

async fn list_posts(
    user: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
    Query(PostsQuery { topic_id }): Query<PostsQuery>,
) -> Result<Json<Vec<Post>>> {
    db.fetch_topic(topic_id)
        .await?
        .ok_or(ServerError::TopicByIdNotFound(topic_id))?;

    Ok(Json(db.fetch_posts(topic_id, user.user.id).await?))
}

async fn create_post(
    user: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
    Json(post): Json<CreatePost>,
) -> Result<(StatusCode, Json<Post>)> {
    let post_id = db
        .create_post(&post, user.user.id)
        .await
        .map_err(|err| match err {
            DbError::ForeignKeyViolation { .. } => ServerError::TopicByIdNotFound(post.topic_id),
            err => err.into(),
        })?;
    info!(post = %post_id, topic = %post.topic_id, "Created post");

    let post = db
        .fetch_post(post_id, user.user.id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(post_id))?;

    Ok((StatusCode::CREATED, Json(post)))
}

async fn get_post(
    PostPath { id }: PostPath,
    user: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<Post>> {
    let post = db
        .fetch_post(id, user.user.id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;

    Ok(Json(post))
}

async fn update_post(
    PostPath { id }: PostPath,
    user: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
    Json(post): Json<UpdatePost>,
) -> Result<Json<MessageResponse>> {
    let outcome = db.update_post(id, user.user.id, &post).await?;
    require_creator(
        outcome,
        ServerError::PostByIdNotFound(id),
        ServerError::NotPostCreator(id),
    )?;

    Ok(Json(MessageResponse::new("Post updated successfully")))
}

async fn delete_post(
    PostPath { id }: PostPath,
    user: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<MessageResponse>> {
    let outcome = db.delete_post(id, user.user.id).await?;
    require_creator(
        outcome,
        ServerError::PostByIdNotFound(id),
        ServerError::NotPostCreator(id),
    )?;
    info!(post = %id, "Deleted post");

    Ok(Json(MessageResponse::new("Post deleted successfully")))
}

async fn react_to_post(
    ReactToPostPath { id }: ReactToPostPath,
    user: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
    Json(ReactionRequest { reaction }): Json<ReactionRequest>,
) -> Result<Json<MessageResponse>> {
    let change = db
        .toggle_post_reaction(id, user.user.id, reaction)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;

    Ok(Json(MessageResponse::new(change.message())))
}
