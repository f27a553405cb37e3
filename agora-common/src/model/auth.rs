use crate::{
    model::{
        Id,
        user::{Password, User, UserMarker},
    },
    util::PositiveDuration,
};
use argon2::{
    Argon2, PasswordHasher, PasswordVerifier,
    password_hash::{self, PasswordHash as PhcHash, Salt, SaltString},
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Debug, Formatter},
    num::ParseIntError,
    sync::LazyLock,
};
use thiserror::Error;
use time::{Duration, OffsetDateTime};

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE_NAME: &str = "Authorisation";
pub const SESSION_LIFETIME: Duration = Duration::days(30);
pub const PASSWORD_SALT_LEN: usize = Salt::RECOMMENDED_LENGTH;

#[derive(Clone, Eq, PartialEq, Debug, Error)]
#[error("Hashing password failed: {0}")]
pub struct PasswordHashingError(password_hash::Error);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The stored password hash is not a valid PHC string")]
pub struct PasswordHashError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Signing the session token failed: {0}")]
    Encode(jsonwebtoken::errors::Error),
    #[error("The session token was rejected: {0}")]
    Invalid(jsonwebtoken::errors::Error),
    #[error("The session token subject is not a user id: {0}")]
    InvalidSubject(ParseIntError),
    #[error("The session token expiry is out of range")]
    ExpiryOutOfRange,
}

/// Argon2 hash of a password in PHC string format.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct PasswordHash(String);

impl PasswordHash {
    pub fn generate(password: &Password) -> Result<Self, PasswordHashingError> {
        let salt_bytes: [u8; PASSWORD_SALT_LEN] = rand::random();
        let salt = SaltString::encode_b64(&salt_bytes).map_err(PasswordHashingError)?;

        let hash = Argon2::default()
            .hash_password(password.get().as_bytes(), &salt)
            .map_err(PasswordHashingError)?;

        Ok(Self(hash.to_string()))
    }

    #[must_use]
    pub fn verify(&self, password: &str) -> bool {
        // Validated on construction, so parsing only fails for a corrupted value.
        PhcHash::new(&self.0).is_ok_and(|hash| {
            Argon2::default()
                .verify_password(password.as_bytes(), &hash)
                .is_ok()
        })
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PasswordHash {
    type Error = PasswordHashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PhcHash::new(&value).map_err(|_| PasswordHashError)?;
        Ok(Self(value))
    }
}

impl Debug for PasswordHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PasswordHash").field(&"[redacted]").finish()
    }
}

/// A user together with the hash their password is checked against.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct Credentials {
    pub user: User,
    pub password_hash: PasswordHash,
}

/// Checked when a login names no existing user, so that an unknown username
/// takes as long to reject as a wrong password.
static DECOY_HASH: LazyLock<Option<PasswordHash>> = LazyLock::new(|| {
    Password::new("decoy password".to_owned())
        .ok()
        .and_then(|password| PasswordHash::generate(&password).ok())
});

impl Credentials {
    /// Returns the user if `password` matches the stored hash.
    #[must_use]
    pub fn authenticate(credentials: Option<Self>, password: &str) -> Option<User> {
        match credentials {
            Some(credentials) => credentials
                .password_hash
                .verify(password)
                .then_some(credentials.user),
            None => {
                if let Some(decoy) = DECOY_HASH.as_ref() {
                    let _ = decoy.verify(password);
                }
                None
            }
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone, Eq, PartialEq, Hash)]
pub struct SessionToken {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

/// HS256 key material for issuing and verifying session tokens.
#[derive(Clone)]
pub struct SessionKeys {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    lifetime: PositiveDuration,
}

impl SessionKeys {
    #[must_use]
    pub fn new(secret: &[u8], lifetime: PositiveDuration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            lifetime,
        }
    }

    #[must_use]
    pub fn lifetime(&self) -> PositiveDuration {
        self.lifetime
    }

    pub fn issue(&self, user_id: Id<UserMarker>) -> Result<SessionToken, SessionError> {
        self.issue_at(user_id, OffsetDateTime::now_utc())
    }

    pub fn issue_at(
        &self,
        user_id: Id<UserMarker>,
        issued_at: OffsetDateTime,
    ) -> Result<SessionToken, SessionError> {
        let expires_at = issued_at
            .checked_add(self.lifetime.get())
            .ok_or(SessionError::ExpiryOutOfRange)?;

        let claims = SessionClaims {
            sub: user_id.to_string(),
            iat: issued_at.unix_timestamp(),
            exp: expires_at.unix_timestamp(),
        };

        let header = Header::new(Algorithm::HS256);
        let token = jsonwebtoken::encode(&header, &claims, &self.encoding_key)
            .map_err(SessionError::Encode)?;

        Ok(SessionToken { token, expires_at })
    }

    /// Checks signature and expiry and returns the user the token was issued to.
    pub fn verify(&self, token: &str) -> Result<Id<UserMarker>, SessionError> {
        let claims =
            jsonwebtoken::decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
                .map_err(SessionError::Invalid)?
                .claims;

        claims.sub.parse().map_err(SessionError::InvalidSubject)
    }
}

impl Debug for SessionKeys {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys")
            .field("keys", &"[redacted]")
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl Debug for SessionToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionToken")
            .field("token", &"[redacted]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
