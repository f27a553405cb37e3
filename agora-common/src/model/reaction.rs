//! Like/dislike marks on posts and comments.
//!
//! A user holds at most one reaction per target. Sending the reaction the
//! user already holds removes it, sending the opposite one switches it.

use crate::model::{Id, user::UserMarker};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{Error, Unexpected},
};
use std::{collections::HashMap, hash::Hash};
use thiserror::Error;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum Reaction {
    Like,
    Dislike,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("A reaction must be 1 (like) or -1 (dislike), got {0}")]
pub struct InvalidReactionError(i64);

impl Reaction {
    #[must_use]
    pub const fn value(self) -> i16 {
        match self {
            Reaction::Like => 1,
            Reaction::Dislike => -1,
        }
    }

    pub const fn from_value(value: i64) -> Result<Self, InvalidReactionError> {
        match value {
            1 => Ok(Reaction::Like),
            -1 => Ok(Reaction::Dislike),
            other => Err(InvalidReactionError(other)),
        }
    }
}

impl TryFrom<i16> for Reaction {
    type Error = InvalidReactionError;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        Self::from_value(value.into())
    }
}

impl From<Reaction> for i16 {
    fn from(value: Reaction) -> Self {
        value.value()
    }
}

impl Serialize for Reaction {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i16(self.value())
    }
}

impl<'de> Deserialize<'de> for Reaction {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = i64::deserialize(deserializer)?;
        Reaction::from_value(inner).map_err(|_| {
            Error::invalid_value(Unexpected::Signed(inner), &"1 (like) or -1 (dislike)")
        })
    }
}

/// Body of a react request.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct ReactionRequest {
    pub reaction: Reaction,
}

/// What toggling a reaction does to the stored row.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ReactionChange {
    /// No row existed, one is inserted.
    Created(Reaction),
    /// The same reaction was sent again, the row is deleted.
    Removed(Reaction),
    /// The opposite reaction was sent, the row is updated.
    Switched { from: Reaction, to: Reaction },
}

impl ReactionChange {
    #[must_use]
    pub fn toggle(existing: Option<Reaction>, requested: Reaction) -> Self {
        match existing {
            None => ReactionChange::Created(requested),
            Some(existing) if existing == requested => ReactionChange::Removed(existing),
            Some(existing) => ReactionChange::Switched {
                from: existing,
                to: requested,
            },
        }
    }

    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            ReactionChange::Created(_) => "Reaction created",
            ReactionChange::Removed(_) => "Reaction deleted",
            ReactionChange::Switched { .. } => "Reaction updated",
        }
    }
}

/// A stored reaction row.
#[derive(Debug)]
pub struct TargetReaction<Target> {
    pub target: Id<Target>,
    pub user: Id<UserMarker>,
    pub reaction: Reaction,
}

/// Reaction counts of one post or comment as seen by one user.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash, Serialize, Deserialize)]
pub struct ReactionSummary {
    pub like_count: i64,
    pub dislike_count: i64,
    pub net_score: i64,
    pub user_reaction: Option<Reaction>,
}

impl ReactionSummary {
    pub fn add(&mut self, reaction: Reaction, by_viewer: bool) {
        match reaction {
            Reaction::Like => self.like_count += 1,
            Reaction::Dislike => self.dislike_count += 1,
        }
        self.net_score = self.like_count - self.dislike_count;

        if by_viewer {
            self.user_reaction = Some(reaction);
        }
    }
}

/// Folds reaction rows into per-target summaries for `viewer`.
///
/// Targets without any reaction are absent from the map; callers fall back
/// to [`ReactionSummary::default`].
pub fn summarize<Target: Eq + Hash>(
    reactions: impl IntoIterator<Item = TargetReaction<Target>>,
    viewer: Id<UserMarker>,
) -> HashMap<Id<Target>, ReactionSummary> {
    let mut summaries: HashMap<Id<Target>, ReactionSummary> = HashMap::new();

    for TargetReaction {
        target,
        user,
        reaction,
    } in reactions
    {
        summaries
            .entry(target)
            .or_default()
            .add(reaction, user == viewer);
    }

    summaries
}
