use crate::server::{
    MessageResponse, Result, ServerError, ServerRouter,
    auth::AuthenticatedUser,
    extract::{Json, Query},
    require_creator,
};
use agora_common::model::{
    Id,
    comment::{Comment, CommentMarker, CreateComment, UpdateComment},
    post::PostMarker,
    reaction::ReactionRequest,
};
use agora_db::client::{DbClient, DbError};
use axum::{extract::State, http::StatusCode, routing::get};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .route("/api/comments", get(list_comments).post(create_comment))
        .typed_get(get_comment)
        .typed_put(update_comment)
        .typed_delete(delete_comment)
        .typed_post(react_to_comment)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/comments/{id}", rejection(ServerError))]
struct CommentPath {
    id: Id<CommentMarker>,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/comments/{id}/react", rejection(ServerError))]
struct ReactToCommentPath {
    id: Id<CommentMarker>,
}

#[derive(Deserialize)]
struct CommentsQuery {
    post_id: Id<PostMarker>,
}

async fn list_comments(
    user: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
    Query(CommentsQuery { post_id }): Query<CommentsQuery>,
) -> Result<Json<Vec<Comment>>> {
    db.fetch_post(post_id, user.user.id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(post_id))?;

    Ok(Json(db.fetch_comments(post_id, user.user.id).await?))
}

async fn create_comment(
    user: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
    Json(comment): Json<CreateComment>,
) -> Result<(StatusCode, Json<Comment>)> {
    let comment_id = db
        .create_comment(&comment, user.user.id)
        .await
        .map_err(|err| match err {
            DbError::ForeignKeyViolation { .. } => ServerError::PostByIdNotFound(comment.post_id),
            err => err.into(),
        })?;
    info!(comment = %comment_id, post = %comment.post_id, "Created comment");

    let comment = db
        .fetch_comment(comment_id, user.user.id)
        .await?
        .ok_or(ServerError::CommentByIdNotFound(comment_id))?;

    Ok((StatusCode::CREATED, Json(comment)))
}

async fn get_comment(
    CommentPath { id }: CommentPath,
    user: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<Comment>> {
    let comment = db
        .fetch_comment(id, user.user.id)
        .await?
        .ok_or(ServerError::CommentByIdNotFound(id))?;

    Ok(Json(comment))
}

async fn update_comment(
    CommentPath { id }: CommentPath,
    user: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
    Json(comment): Json<UpdateComment>,
) -> Result<Json<MessageResponse>> {
    let outcome = db.update_comment(id, user.user.id, &comment).await?;
    require_creator(
        outcome,
        ServerError::CommentByIdNotFound(id),
        ServerError::NotCommentCreator(id),
    )?;

    Ok(Json(MessageResponse::new("Comment updated successfully")))
}

async fn delete_comment(
    CommentPath { id }: CommentPath,
    user: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
) -> Result<Json<MessageResponse>> {
    let outcome = db.delete_comment(id, user.user.id).await?;
    require_creator(
        outcome,
        ServerError::CommentByIdNotFound(id),
        ServerError::NotCommentCreator(id),
    )?;
    info!(comment = %id, "Deleted comment");

    Ok(Json(MessageResponse::new("Comment deleted successfully")))
}

async fn react_to_comment(
    ReactToCommentPath { id }: ReactToCommentPath,
    user: AuthenticatedUser,
    State(db): State<Arc<DbClient>>,
    Json(ReactionRequest { reaction }): Json<ReactionRequest>,
) -> Result<Json<MessageResponse>> {
    let change = db
        .toggle_comment_reaction(id, user.user.id, reaction)
        .await?
        .ok_or(ServerError::CommentByIdNotFound(id))?;

    Ok(Json(MessageResponse::new(change.message())))
}
