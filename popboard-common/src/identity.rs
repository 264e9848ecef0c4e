//! Player handles
//!
//! A handle is 1-10 ASCII alphanumeric characters. The score engine itself
//! trusts whatever string it is given; validation happens once, at the edge
//! where a client first presents the handle.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum handle length in characters
pub const MAX_IDENTITY_LEN: usize = 10;

/// A validated player handle
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Validate a raw handle
    ///
    /// Surrounding whitespace is trimmed first, matching what the login form
    /// does before submitting.
    pub fn parse(raw: &str) -> Result<Self> {
        let handle = raw.trim();

        if handle.is_empty() {
            return Err(Error::InvalidIdentity("handle is empty".to_string()));
        }
        if handle.chars().count() > MAX_IDENTITY_LEN {
            return Err(Error::InvalidIdentity(format!(
                "'{}' exceeds {} characters",
                handle, MAX_IDENTITY_LEN
            )));
        }
        if !handle.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::InvalidIdentity(format!(
                "'{}' must contain only letters and digits",
                handle
            )));
        }

        Ok(Self(handle.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<String> for Identity {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
