//! Validated user-supplied text shared by topics, posts and comments.

use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use thiserror::Error;

pub const TITLE_MAX_LEN: usize = 255;

/// Title of a topic or post: 1 to [`TITLE_MAX_LEN`] characters, not blank.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct Title(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The title must be between 1 and {TITLE_MAX_LEN} characters: {0:?}")]
pub struct InvalidTitleError(String);

/// Free-form content of a post or comment, must not be blank.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct Body(String);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The content must not be empty")]
pub struct InvalidBodyError;

impl Title {
    pub fn new(title: String) -> Result<Self, InvalidTitleError> {
        if !title.trim().is_empty() && title.chars().count() <= TITLE_MAX_LEN {
            Ok(Self(title))
        } else {
            Err(InvalidTitleError(title))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl Body {
    pub fn new(body: String) -> Result<Self, InvalidBodyError> {
        if body.trim().is_empty() {
            Err(InvalidBodyError)
        } else {
            Ok(Self(body))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Title {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        Title::new(inner)
            .map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"Title"))
    }
}

impl<'de> Deserialize<'de> for Body {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        Body::new(inner).map_err(|_| Error::invalid_length(0, &"non-empty content"))
    }
}
