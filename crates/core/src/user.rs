//! Acting user identity.

use serde::{Deserialize, Serialize};

/// Name of the user the framework acts as when nobody is impersonated.
pub const SYSTEM_USER: &str = "__system";

/// Snapshot of the user an interaction runs as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMemento {
    pub name: String,
    pub roles: Vec<String>,
}

impl UserMemento {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            roles: Vec::new(),
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn system() -> Self {
        Self::new(SYSTEM_USER)
    }

    pub fn is_system(&self) -> bool {
        self.name == SYSTEM_USER
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Whether replaying a command impersonates the user who originally invoked it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SudoPolicy {
    /// Run as whoever drives execution (typically the system user).
    NoSwitch,
    /// Run as the original invoker so auditing reflects the real actor.
    #[default]
    Switch,
}
