//! Resolved identities

use serde::Serialize;
use std::fmt;

/// Username of a kit
pub type KitId = String;

/// The identity a verified credential resolves to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "username", rename_all = "snake_case")]
pub enum Principal {
    /// A human user who may own kits
    Person(String),
    /// A device that publishes measurements
    Kit(KitId),
}

impl Principal {
    pub fn person(username: impl Into<String>) -> Self {
        Principal::Person(username.into())
    }

    pub fn kit(username: impl Into<String>) -> Self {
        Principal::Kit(username.into())
    }

    pub fn username(&self) -> &str {
        match self {
            Principal::Person(username) | Principal::Kit(username) => username,
        }
    }

    /// The kit username, if this principal is a kit
    pub fn as_kit(&self) -> Option<&str> {
        match self {
            Principal::Kit(username) => Some(username),
            Principal::Person(_) => None,
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Principal::Person(username) => write!(f, "person:{}", username),
            Principal::Kit(username) => write!(f, "kit:{}", username),
        }
    }
}
