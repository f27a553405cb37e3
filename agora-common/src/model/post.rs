use crate::model::{
    Id,
    reaction::ReactionSummary,
    text::{Body, Title},
    topic::TopicMarker,
    user::{UserMarker, Username},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

/// A post with its author's name and the reactions it received.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Post {
    pub id: Id<PostMarker>,
    pub topic_id: Id<TopicMarker>,
    pub title: Title,
    pub content: Body,
    pub created_by: Option<Id<UserMarker>>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// `None` once the author's account is gone.
    pub username: Option<Username>,
    #[serde(flatten)]
    pub reactions: ReactionSummary,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct CreatePost {
    pub topic_id: Id<TopicMarker>,
    pub title: Title,
    pub content: Body,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct UpdatePost {
    pub title: Title,
    pub content: Body,
}
