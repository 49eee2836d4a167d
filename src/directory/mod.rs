//! Kit Directory
//!
//! Identity and ownership lookups used by token verification and the
//! subscribe handler. The trait is the seam to whatever user store backs
//! the deployment; [`InMemoryDirectory`] is seeded from configuration.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::auth::{KitId, Principal};
use crate::config::DirectoryConfig;

/// Errors raised by directory lookups
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Directory unavailable: {0}")]
    Unavailable(String),
}

/// A registered kit and the persons owning it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kit {
    pub username: KitId,
    pub name: String,
    pub owners: HashSet<String>,
}

impl Kit {
    pub fn new(username: impl Into<String>) -> Self {
        let username = username.into();
        Self {
            name: username.clone(),
            username,
            owners: HashSet::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn owned_by(mut self, person: impl Into<String>) -> Self {
        self.owners.insert(person.into());
        self
    }

    pub fn is_owned_by(&self, person: &str) -> bool {
        self.owners.contains(person)
    }
}

/// Identity and ownership lookups
#[async_trait]
pub trait KitDirectory: Send + Sync {
    /// Resolve a username to a person or kit
    async fn resolve_principal(&self, username: &str) -> Result<Principal, DirectoryError>;

    /// Look up a kit by username
    async fn resolve_kit(&self, kit_id: &str) -> Result<Kit, DirectoryError>;

    /// Whether `principal` may receive measurements of `kit`.
    ///
    /// Owners may subscribe, and a kit may subscribe to itself.
    async fn has_subscribe_permission(&self, principal: &Principal, kit: &Kit) -> bool {
        match principal {
            Principal::Person(username) => kit.is_owned_by(username),
            Principal::Kit(username) => *username == kit.username,
        }
    }
}

/// Directory held entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    persons: HashSet<String>,
    kits: HashMap<KitId, Kit>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &DirectoryConfig) -> Self {
        let mut directory = Self::new();
        for person in &config.persons {
            directory.persons.insert(person.username.clone());
        }
        for entry in &config.kits {
            let mut kit = Kit::new(&entry.username);
            if let Some(name) = &entry.name {
                kit = kit.name(name);
            }
            for owner in &entry.owners {
                if !directory.persons.contains(owner) {
                    tracing::warn!(kit = %entry.username, owner = %owner, "Kit owner is not a configured person");
                }
                kit = kit.owned_by(owner);
            }
            directory.kits.insert(kit.username.clone(), kit);
        }

        tracing::debug!(
            persons = directory.persons.len(),
            kits = directory.kits.len(),
            "Loaded kit directory"
        );
        directory
    }

    pub fn with_person(mut self, username: impl Into<String>) -> Self {
        self.persons.insert(username.into());
        self
    }

    pub fn with_kit(mut self, kit: Kit) -> Self {
        self.kits.insert(kit.username.clone(), kit);
        self
    }

    pub fn kit_count(&self) -> usize {
        self.kits.len()
    }
}

#[async_trait]
impl KitDirectory for InMemoryDirectory {
    async fn resolve_principal(&self, username: &str) -> Result<Principal, DirectoryError> {
        if self.kits.contains_key(username) {
            Ok(Principal::kit(username))
        } else if self.persons.contains(username) {
            Ok(Principal::person(username))
        } else {
            Err(DirectoryError::NotFound(username.to_string()))
        }
    }

    async fn resolve_kit(&self, kit_id: &str) -> Result<Kit, DirectoryError> {
        self.kits
            .get(kit_id)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(kit_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KitEntry, PersonEntry};

    fn directory() -> InMemoryDirectory {
        InMemoryDirectory::new()
            .with_person("alice")
            .with_person("bob")
            .with_kit(Kit::new("kit42").owned_by("alice"))
    }

    #[tokio::test]
    async fn test_resolve_principal() {
        let dir = directory();
        assert_eq!(dir.resolve_principal("alice").await.unwrap(), Principal::person("alice"));
        assert_eq!(dir.resolve_principal("kit42").await.unwrap(), Principal::kit("kit42"));
        assert!(matches!(
            dir.resolve_principal("nobody").await,
            Err(DirectoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_subscribe_permission() {
        let dir = directory();
        let kit = dir.resolve_kit("kit42").await.unwrap();

        assert!(dir.has_subscribe_permission(&Principal::person("alice"), &kit).await);
        assert!(dir.has_subscribe_permission(&Principal::kit("kit42"), &kit).await);
        assert!(!dir.has_subscribe_permission(&Principal::person("bob"), &kit).await);
        assert!(!dir.has_subscribe_permission(&Principal::kit("kit7"), &kit).await);
    }

    #[test]
    fn test_from_config() {
        let config = DirectoryConfig {
            persons: vec![PersonEntry {
                username: "alice".to_string(),
            }],
            kits: vec![KitEntry {
                username: "kit42".to_string(),
                name: Some("Greenhouse".to_string()),
                owners: vec!["alice".to_string()],
            }],
        };

        let dir = InMemoryDirectory::from_config(&config);
        assert_eq!(dir.kit_count(), 1);
        let kit = &dir.kits["kit42"];
        assert_eq!(kit.name, "Greenhouse");
        assert!(kit.is_owned_by("alice"));
    }
}
