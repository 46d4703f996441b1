use crate::error::{ColloquyError, ColloquyResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum accepted length of a session key, in bytes.
pub const MAX_SESSION_ID_LEN: usize = 128;

/// An opaque, validated session key.
///
/// Clients usually send a UUID, but any printable token made of ASCII
/// letters, digits and `-`, `_`, `.`, `:` is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Validates `raw` and wraps it.
    pub fn parse(raw: &str) -> ColloquyResult<Self> {
        if raw.is_empty() {
            return Err(ColloquyError::InvalidSessionId("session id is empty".into()));
        }
        if raw.len() > MAX_SESSION_ID_LEN {
            return Err(ColloquyError::InvalidSessionId(format!(
                "session id is longer than {MAX_SESSION_ID_LEN} bytes"
            )));
        }
        if let Some(bad) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')))
        {
            return Err(ColloquyError::InvalidSessionId(format!(
                "session id contains invalid character {bad:?}"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for SessionId {
    type Err = ColloquyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SessionId {
    type Error = ColloquyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}
