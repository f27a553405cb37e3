use agora_common::model::{
    Id, ModelValidationError,
    auth::{Credentials, PasswordHash},
    comment::Comment,
    post::Post,
    reaction::{Reaction, ReactionSummary, TargetReaction},
    text::{Body, Title},
    topic::Topic,
    user::{User, Username},
};
use sqlx::FromRow;
use time::OffsetDateTime;

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct UserRecord {
    pub id: i64,
    pub username: String,
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct CredentialsRecord {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct TopicRecord {
    pub id: i64,
    pub title: String,
    pub created_by: Option<i64>,
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct PostRecord {
    pub id: i64,
    pub topic_id: i64,
    pub title: String,
    pub content: String,
    pub created_by: Option<i64>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub username: Option<String>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct CommentRecord {
    pub id: i64,
    pub post_id: i64,
    pub content: String,
    pub created_by: Option<i64>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub username: Option<String>,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct ReactionRecord {
    pub target_id: i64,
    pub user_id: i64,
    pub reaction: i16,
}

impl TryFrom<UserRecord> for User {
    type Error = ModelValidationError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.id.into(),
            username: Username::new(value.username)?,
            created_at: value.created_at,
        })
    }
}

impl TryFrom<CredentialsRecord> for Credentials {
    type Error = ModelValidationError;

    fn try_from(value: CredentialsRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            user: User {
                id: value.id.into(),
                username: Username::new(value.username)?,
                created_at: value.created_at,
            },
            password_hash: PasswordHash::try_from(value.password)?,
        })
    }
}

impl TryFrom<TopicRecord> for Topic {
    type Error = ModelValidationError;

    fn try_from(value: TopicRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.id.into(),
            title: Title::new(value.title)?,
            created_by: value.created_by.map(Id::new),
            created_at: value.created_at,
        })
    }
}

impl PostRecord {
    pub fn into_post(self, reactions: ReactionSummary) -> Result<Post, ModelValidationError> {
        Ok(Post {
            id: self.id.into(),
            topic_id: self.topic_id.into(),
            title: Title::new(self.title)?,
            content: Body::new(self.content)?,
            created_by: self.created_by.map(Id::new),
            created_at: self.created_at,
            updated_at: self.updated_at,
            username: self.username.map(Username::new).transpose()?,
            reactions,
        })
    }
}

impl CommentRecord {
    pub fn into_comment(self, reactions: ReactionSummary) -> Result<Comment, ModelValidationError> {
        Ok(Comment {
            id: self.id.into(),
            post_id: self.post_id.into(),
            content: Body::new(self.content)?,
            created_by: self.created_by.map(Id::new),
            created_at: self.created_at,
            updated_at: self.updated_at,
            username: self.username.map(Username::new).transpose()?,
            reactions,
        })
    }
}

impl<Target> TryFrom<ReactionRecord> for TargetReaction<Target> {
    type Error = ModelValidationError;

    fn try_from(value: ReactionRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            target: value.target_id.into(),
            user: value.user_id.into(),
            reaction: Reaction::try_from(value.reaction)?,
        })
    }
}
