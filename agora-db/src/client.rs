use crate::record::{
    CommentRecord, CredentialsRecord, PostRecord, ReactionRecord, TopicRecord, UserRecord,
};
use agora_common::model::{
    Id, ModelValidationError,
    auth::{Credentials, PasswordHash},
    comment::{Comment, CommentMarker, CreateComment, UpdateComment},
    post::{CreatePost, Post, PostMarker, UpdatePost},
    reaction::{Reaction, ReactionChange, ReactionSummary, TargetReaction, summarize},
    topic::{CreateTopic, Topic, TopicMarker},
    user::{User, UserMarker, Username},
};
use sqlx::{
    PgPool, Postgres, Transaction, error::ErrorKind, migrate::MigrateError, query, query_as,
    query_scalar,
};
use std::{collections::HashMap, hash::Hash};
use thiserror::Error;
use tracing::debug;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("Unique constraint {constraint:?} was violated")]
    UniqueViolation { constraint: Option<String> },
    #[error("Foreign key constraint {constraint:?} was violated")]
    ForeignKeyViolation { constraint: Option<String> },
    #[error("Running migrations failed: {0}")]
    Migrate(#[from] MigrateError),
    #[error(transparent)]
    Sqlx(sqlx::Error),
}

impl From<sqlx::Error> for DbError {
    fn from(value: sqlx::Error) -> Self {
        let Some((kind, constraint)) = value
            .as_database_error()
            .map(|error| (error.kind(), error.constraint().map(str::to_owned)))
        else {
            return DbError::Sqlx(value);
        };

        match kind {
            ErrorKind::UniqueViolation => DbError::UniqueViolation { constraint },
            ErrorKind::ForeignKeyViolation => DbError::ForeignKeyViolation { constraint },
            _ => DbError::Sqlx(value),
        }
    }
}

/// Result of an update or delete that only the resource's creator may perform.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum OwnedMutation {
    Applied,
    NotOwner,
    NotFound,
}

/// Statements of one reaction table; posts and comments share the toggle logic.
struct ReactionQueries {
    lock_target: &'static str,
    select: &'static str,
    insert: &'static str,
    update: &'static str,
    delete: &'static str,
    list: &'static str,
}

const POST_REACTIONS: ReactionQueries = ReactionQueries {
    lock_target: "SELECT id FROM posts WHERE id = $1 FOR SHARE",
    select: "SELECT reaction FROM post_reactions WHERE post_id = $1 AND user_id = $2 FOR UPDATE",
    insert: "INSERT INTO post_reactions (post_id, user_id, reaction) VALUES ($1, $2, $3)",
    update: "UPDATE post_reactions SET reaction = $3 WHERE post_id = $1 AND user_id = $2",
    delete: "DELETE FROM post_reactions WHERE post_id = $1 AND user_id = $2",
    list: "
        SELECT post_id AS target_id, user_id, reaction
        FROM post_reactions
        WHERE post_id = ANY($1)
        ",
};

const COMMENT_REACTIONS: ReactionQueries = ReactionQueries {
    lock_target: "SELECT id FROM comments WHERE id = $1 FOR SHARE",
    select: "
        SELECT reaction FROM comment_reactions
        WHERE comment_id = $1 AND user_id = $2
        FOR UPDATE
        ",
    insert: "INSERT INTO comment_reactions (comment_id, user_id, reaction) VALUES ($1, $2, $3)",
    update: "UPDATE comment_reactions SET reaction = $3 WHERE comment_id = $1 AND user_id = $2",
    delete: "DELETE FROM comment_reactions WHERE comment_id = $1 AND user_id = $2",
    list: "
        SELECT comment_id AS target_id, user_id, reaction
        FROM comment_reactions
        WHERE comment_id = ANY($1)
        ",
};

const SELECT_POSTS: &str = "
    SELECT
        posts.id,
        posts.topic_id,
        posts.title,
        posts.content,
        posts.created_by,
        posts.created_at,
        posts.updated_at,
        users.username
    FROM
        posts LEFT JOIN users ON posts.created_by = users.id
    ";

const SELECT_COMMENTS: &str = "
    SELECT
        comments.id,
        comments.post_id,
        comments.content,
        comments.created_by,
        comments.created_at,
        comments.updated_at,
        users.username
    FROM
        comments LEFT JOIN users ON comments.created_by = users.id
    ";

#[derive(Debug)]
pub struct DbClient {
    pool: PgPool,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!().run(&self.pool).await?;
        Ok(())
    }

    pub async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT id, username, created_at
            FROM users
            WHERE id = $1
            ",
        )
        .bind(user_id.get())
        .fetch_optional(&self.pool)
        .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    pub async fn fetch_credentials(&self, username: &str) -> Result<Option<Credentials>> {
        let record = query_as::<_, CredentialsRecord>(
            "
            SELECT id, username, password, created_at
            FROM users
            WHERE username = $1
            ",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        let credentials = record.map(Credentials::try_from).transpose()?;
        Ok(credentials)
    }

    /// Fails with [`DbError::UniqueViolation`] if the username is taken.
    pub async fn create_user(
        &self,
        username: &Username,
        password_hash: &PasswordHash,
    ) -> Result<User> {
        let record = query_as::<_, UserRecord>(
            "
            INSERT INTO users (username, password)
            VALUES ($1, $2)
            RETURNING id, username, created_at
            ",
        )
        .bind(username.get())
        .bind(password_hash.get())
        .fetch_one(&self.pool)
        .await?;

        Ok(User::try_from(record)?)
    }

    pub async fn fetch_topics(&self) -> Result<Vec<Topic>> {
        let records = query_as::<_, TopicRecord>(
            "
            SELECT id, title, created_by, created_at
            FROM topics
            ORDER BY created_at, id
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        let topics = records
            .into_iter()
            .map(Topic::try_from)
            .collect::<Result<_, _>>()?;
        Ok(topics)
    }

    pub async fn fetch_topic(&self, topic_id: Id<TopicMarker>) -> Result<Option<Topic>> {
        let record = query_as::<_, TopicRecord>(
            "
            SELECT id, title, created_by, created_at
            FROM topics
            WHERE id = $1
            ",
        )
        .bind(topic_id.get())
        .fetch_optional(&self.pool)
        .await?;

        let topic = record.map(Topic::try_from).transpose()?;
        Ok(topic)
    }

    /// Fails with [`DbError::UniqueViolation`] if the title is taken.
    pub async fn create_topic(&self, topic: &CreateTopic, author: Id<UserMarker>) -> Result<Topic> {
        let record = query_as::<_, TopicRecord>(
            "
            INSERT INTO topics (title, created_by)
            VALUES ($1, $2)
            RETURNING id, title, created_by, created_at
            ",
        )
        .bind(topic.title.get())
        .bind(author.get())
        .fetch_one(&self.pool)
        .await?;

        Ok(Topic::try_from(record)?)
    }

    /// Deleting a topic cascades to its posts and their comments.
    pub async fn delete_topic(
        &self,
        topic_id: Id<TopicMarker>,
        user_id: Id<UserMarker>,
    ) -> Result<OwnedMutation> {
        let rows_affected = query("DELETE FROM topics WHERE id = $1 AND created_by = $2")
            .bind(topic_id.get())
            .bind(user_id.get())
            .execute(&self.pool)
            .await?
            .rows_affected();

        self.ownership_outcome(
            rows_affected,
            "SELECT created_by FROM topics WHERE id = $1",
            topic_id,
        )
        .await
    }

    pub async fn fetch_posts(
        &self,
        topic_id: Id<TopicMarker>,
        viewer: Id<UserMarker>,
    ) -> Result<Vec<Post>> {
        let records = query_as::<_, PostRecord>(&format!(
            "{SELECT_POSTS} WHERE posts.topic_id = $1 ORDER BY posts.created_at, posts.id"
        ))
        .bind(topic_id.get())
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<i64> = records.iter().map(|record| record.id).collect();
        let mut summaries = self
            .fetch_reaction_summaries::<PostMarker>(&POST_REACTIONS, &ids, viewer)
            .await?;

        let posts = records
            .into_iter()
            .map(|record| {
                let reactions = summaries.remove(&Id::new(record.id)).unwrap_or_default();
                record.into_post(reactions)
            })
            .collect::<Result<_, _>>()?;
        Ok(posts)
    }

    pub async fn fetch_post(
        &self,
        post_id: Id<PostMarker>,
        viewer: Id<UserMarker>,
    ) -> Result<Option<Post>> {
        let record = query_as::<_, PostRecord>(&format!("{SELECT_POSTS} WHERE posts.id = $1"))
            .bind(post_id.get())
            .fetch_optional(&self.pool)
            .await?;

        let Some(record) = record else {
            return Ok(None);
        };

        let reactions = self
            .fetch_reaction_summaries::<PostMarker>(&POST_REACTIONS, &[record.id], viewer)
            .await?
            .remove(&post_id)
            .unwrap_or_default();

        Ok(Some(record.into_post(reactions)?))
    }

    /// Fails with [`DbError::ForeignKeyViolation`] if the topic does not exist.
    pub async fn create_post(
        &self,
        post: &CreatePost,
        author: Id<UserMarker>,
    ) -> Result<Id<PostMarker>> {
        let post_id = query_scalar::<_, i64>(
            "
            INSERT INTO posts (topic_id, title, content, created_by)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            ",
        )
        .bind(post.topic_id.get())
        .bind(post.title.get())
        .bind(post.content.get())
        .bind(author.get())
        .fetch_one(&self.pool)
        .await?;

        Ok(post_id.into())
    }

    pub async fn update_post(
        &self,
        post_id: Id<PostMarker>,
        user_id: Id<UserMarker>,
        post: &UpdatePost,
    ) -> Result<OwnedMutation> {
        let rows_affected = query(
            "
            UPDATE posts
            SET title = $3, content = $4, updated_at = NOW()
            WHERE id = $1 AND created_by = $2
            ",
        )
        .bind(post_id.get())
        .bind(user_id.get())
        .bind(post.title.get())
        .bind(post.content.get())
        .execute(&self.pool)
        .await?
        .rows_affected();

        self.ownership_outcome(
            rows_affected,
            "SELECT created_by FROM posts WHERE id = $1",
            post_id,
        )
        .await
    }

    /// Deleting a post cascades to its comments and reactions.
    pub async fn delete_post(
        &self,
        post_id: Id<PostMarker>,
        user_id: Id<UserMarker>,
    ) -> Result<OwnedMutation> {
        let rows_affected = query("DELETE FROM posts WHERE id = $1 AND created_by = $2")
            .bind(post_id.get())
            .bind(user_id.get())
            .execute(&self.pool)
            .await?
            .rows_affected();

        self.ownership_outcome(
            rows_affected,
            "SELECT created_by FROM posts WHERE id = $1",
            post_id,
        )
        .await
    }

    pub async fn fetch_comments(
        &self,
        post_id: Id<PostMarker>,
        viewer: Id<UserMarker>,
    ) -> Result<Vec<Comment>> {
        let records = query_as::<_, CommentRecord>(&format!(
            "{SELECT_COMMENTS}
            WHERE comments.post_id = $1
            ORDER BY comments.created_at, comments.id"
        ))
        .bind(post_id.get())
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<i64> = records.iter().map(|record| record.id).collect();
        let mut summaries = self
            .fetch_reaction_summaries::<CommentMarker>(&COMMENT_REACTIONS, &ids, viewer)
            .await?;

        let comments = records
            .into_iter()
            .map(|record| {
                let reactions = summaries.remove(&Id::new(record.id)).unwrap_or_default();
                record.into_comment(reactions)
            })
            .collect::<Result<_, _>>()?;
        Ok(comments)
    }

    pub async fn fetch_comment(
        &self,
        comment_id: Id<CommentMarker>,
        viewer: Id<UserMarker>,
    ) -> Result<Option<Comment>> {
        let record =
            query_as::<_, CommentRecord>(&format!("{SELECT_COMMENTS} WHERE comments.id = $1"))
                .bind(comment_id.get())
                .fetch_optional(&self.pool)
                .await?;

        let Some(record) = record else {
            return Ok(None);
        };

        let reactions = self
            .fetch_reaction_summaries::<CommentMarker>(&COMMENT_REACTIONS, &[record.id], viewer)
            .await?
            .remove(&comment_id)
            .unwrap_or_default();

        Ok(Some(record.into_comment(reactions)?))
    }

    /// Fails with [`DbError::ForeignKeyViolation`] if the post does not exist.
    pub async fn create_comment(
        &self,
        comment: &CreateComment,
        author: Id<UserMarker>,
    ) -> Result<Id<CommentMarker>> {
        let comment_id = query_scalar::<_, i64>(
            "
            INSERT INTO comments (post_id, content, created_by)
            VALUES ($1, $2, $3)
            RETURNING id
            ",
        )
        .bind(comment.post_id.get())
        .bind(comment.content.get())
        .bind(author.get())
        .fetch_one(&self.pool)
        .await?;

        Ok(comment_id.into())
    }

    pub async fn update_comment(
        &self,
        comment_id: Id<CommentMarker>,
        user_id: Id<UserMarker>,
        comment: &UpdateComment,
    ) -> Result<OwnedMutation> {
        let rows_affected = query(
            "
            UPDATE comments
            SET content = $3, updated_at = NOW()
            WHERE id = $1 AND created_by = $2
            ",
        )
        .bind(comment_id.get())
        .bind(user_id.get())
        .bind(comment.content.get())
        .execute(&self.pool)
        .await?
        .rows_affected();

        self.ownership_outcome(
            rows_affected,
            "SELECT created_by FROM comments WHERE id = $1",
            comment_id,
        )
        .await
    }

    pub async fn delete_comment(
        &self,
        comment_id: Id<CommentMarker>,
        user_id: Id<UserMarker>,
    ) -> Result<OwnedMutation> {
        let rows_affected = query("DELETE FROM comments WHERE id = $1 AND created_by = $2")
            .bind(comment_id.get())
            .bind(user_id.get())
            .execute(&self.pool)
            .await?
            .rows_affected();

        self.ownership_outcome(
            rows_affected,
            "SELECT created_by FROM comments WHERE id = $1",
            comment_id,
        )
        .await
    }

    /// Returns `None` if the post does not exist.
    pub async fn toggle_post_reaction(
        &self,
        post_id: Id<PostMarker>,
        user_id: Id<UserMarker>,
        reaction: Reaction,
    ) -> Result<Option<ReactionChange>> {
        self.toggle_reaction(&POST_REACTIONS, post_id.get(), user_id, reaction)
            .await
    }

    /// Returns `None` if the comment does not exist.
    pub async fn toggle_comment_reaction(
        &self,
        comment_id: Id<CommentMarker>,
        user_id: Id<UserMarker>,
        reaction: Reaction,
    ) -> Result<Option<ReactionChange>> {
        self.toggle_reaction(&COMMENT_REACTIONS, comment_id.get(), user_id, reaction)
            .await
    }

    async fn toggle_reaction(
        &self,
        queries: &ReactionQueries,
        target_id: i64,
        user_id: Id<UserMarker>,
        requested: Reaction,
    ) -> Result<Option<ReactionChange>> {
        let attempt = self
            .try_toggle_reaction(queries, target_id, user_id, requested)
            .await;

        match attempt {
            // A concurrent first reaction by the same user committed its row in between.
            Err(DbError::UniqueViolation { .. }) => {
                debug!(target_id, %user_id, "Reaction insert raced, toggling again");
                self.try_toggle_reaction(queries, target_id, user_id, requested)
                    .await
            }
            attempt => attempt,
        }
    }

    async fn try_toggle_reaction(
        &self,
        queries: &ReactionQueries,
        target_id: i64,
        user_id: Id<UserMarker>,
        requested: Reaction,
    ) -> Result<Option<ReactionChange>> {
        let mut transaction = self.pool.begin().await?;

        let target = query_scalar::<_, i64>(queries.lock_target)
            .bind(target_id)
            .fetch_optional(&mut *transaction)
            .await?;
        if target.is_none() {
            return Ok(None);
        }

        let existing = query_scalar::<_, i16>(queries.select)
            .bind(target_id)
            .bind(user_id.get())
            .fetch_optional(&mut *transaction)
            .await?
            .map(Reaction::try_from)
            .transpose()
            .map_err(ModelValidationError::from)?;

        let change = ReactionChange::toggle(existing, requested);
        apply_reaction_change(&mut transaction, queries, target_id, user_id, change).await?;
        transaction.commit().await?;

        debug!(target_id, %user_id, ?change, "Toggled reaction");
        Ok(Some(change))
    }

    async fn fetch_reaction_summaries<Target: Eq + Hash>(
        &self,
        queries: &ReactionQueries,
        target_ids: &[i64],
        viewer: Id<UserMarker>,
    ) -> Result<HashMap<Id<Target>, ReactionSummary>> {
        if target_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let records = query_as::<_, ReactionRecord>(queries.list)
            .bind(target_ids)
            .fetch_all(&self.pool)
            .await?;

        let reactions = records
            .into_iter()
            .map(TargetReaction::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(summarize(reactions, viewer))
    }

    /// Tells apart why a conditional update or delete touched no row.
    async fn ownership_outcome<Marker>(
        &self,
        rows_affected: u64,
        select_creator: &'static str,
        id: Id<Marker>,
    ) -> Result<OwnedMutation> {
        if rows_affected > 0 {
            return Ok(OwnedMutation::Applied);
        }

        let creator = query_scalar::<_, Option<i64>>(select_creator)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?;

        Ok(match creator {
            None => OwnedMutation::NotFound,
            Some(_) => OwnedMutation::NotOwner,
        })
    }
}

async fn apply_reaction_change(
    transaction: &mut Transaction<'_, Postgres>,
    queries: &ReactionQueries,
    target_id: i64,
    user_id: Id<UserMarker>,
    change: ReactionChange,
) -> Result<()> {
    let statement = match change {
        ReactionChange::Created(reaction) => query(queries.insert)
            .bind(target_id)
            .bind(user_id.get())
            .bind(reaction.value()),
        ReactionChange::Switched { to, .. } => query(queries.update)
            .bind(target_id)
            .bind(user_id.get())
            .bind(to.value()),
        ReactionChange::Removed(_) => query(queries.delete)
            .bind(target_id)
            .bind(user_id.get()),
    };

    statement.execute(&mut **transaction).await?;
    Ok(())
}
