use std::fmt;

use crate::error::{Error, Result};

/// Username/password pair for the admin database.
///
/// A pair is either complete or absent; a half-filled pair never gets
/// past [`Credentials::from_parts`].
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Build credentials from optional config values. Empty strings count
    /// as absent.
    pub fn from_parts(username: Option<&str>, password: Option<&str>) -> Result<Option<Self>> {
        let username = username.filter(|u| !u.is_empty());
        let password = password.filter(|p| !p.is_empty());

        match (username, password) {
            (Some(u), Some(p)) => Ok(Some(Self::new(u, p))),
            (None, None) => Ok(None),
            (Some(_), None) => Err(Error::Config(
                "username is set but password is missing".to_string(),
            )),
            (None, Some(_)) => Err(Error::Config(
                "password is set but username is missing".to_string(),
            )),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
