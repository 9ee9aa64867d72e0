//! Opaque references to domain objects.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A resolvable reference standing in for a live domain object.
///
/// Bookmarks are what descriptors carry instead of objects: they survive process
/// restarts and are resolved back to the current state of the object at replay time.
///
/// The canonical string form is `"<object_type>:<identifier>"`, e.g. `"Invoice:INV-7"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    object_type: String,
    identifier: String,
}

impl Bookmark {
    pub fn new(object_type: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            identifier: identifier.into(),
        }
    }

    /// Logical type name, as registered in the metamodel.
    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl core::fmt::Display for Bookmark {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.object_type, self.identifier)
    }
}

impl FromStr for Bookmark {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Identifiers may themselves contain ':', the type never does.
        let (object_type, identifier) = s
            .split_once(':')
            .ok_or_else(|| DomainError::invalid_id(format!("bookmark '{s}' has no ':' separator")))?;

        if object_type.is_empty() || identifier.is_empty() {
            return Err(DomainError::invalid_id(format!(
                "bookmark '{s}' has an empty type or identifier"
            )));
        }

        Ok(Self::new(object_type, identifier))
    }
}
