//! Connection string validation and redaction

use super::Role;
use crate::error::ValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// `postgres[ql]://user:password@host:port/database[?params]`, matched lower-cased
static CONNECTION_STRING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^postgres(ql)?://[^:]+:[^@]+@[^:]+:\d+/\w+(\?.*)?$")
        .expect("connection string pattern is valid")
});

/// A validated connection string.
///
/// `Debug` and `Display` never show the password; use [`Credential::expose`]
/// to get the raw string for the backend or for persistence.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Check the shape of `raw` without any network access
    pub fn parse(role: Role, raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyCredential);
        }

        if !CONNECTION_STRING.is_match(&trimmed.to_lowercase()) {
            return Err(ValidationError::MalformedCredential { role });
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// `user@host:port/db` part after the scheme, split at the password
    fn parts(&self) -> Option<(&str, &str, &str)> {
        let (scheme, rest) = self.0.split_once("://")?;
        let (user, after_user) = rest.split_once(':')?;
        let (_password, location) = after_user.split_once('@')?;
        Some((scheme, user, location))
    }

    pub fn host(&self) -> Option<&str> {
        let (_, _, location) = self.parts()?;
        location.split(':').next()
    }

    /// Database name, without query parameters
    pub fn database(&self) -> Option<&str> {
        let (_, _, location) = self.parts()?;
        let (_, path) = location.split_once('/')?;
        path.split('?').next().filter(|name| !name.is_empty())
    }

    pub fn redacted(&self) -> String {
        match self.parts() {
            Some((scheme, user, location)) => format!("{}://{}:***@{}", scheme, user, location),
            None => "***".to_string(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&self.redacted()).finish()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}
