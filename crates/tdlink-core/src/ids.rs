//! Correlation identifiers.
//!
//! A [`ConfirmId`] travels in the `confirm_id` field of an envelope. The
//! receiving side echoes it back in a confirm event so the sender can match
//! the reply to the request. IDs are UUID v7 (time-ordered) but peers may
//! send any opaque string, so parsing never validates the format.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque correlation identifier carried in `confirm_id`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfirmId(String);

impl ConfirmId {
    /// Create a new random ID (UUID v7, time-ordered).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume self and return the inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Default for ConfirmId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for ConfirmId {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ConfirmId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfirmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ConfirmId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConfirmId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl PartialEq<str> for ConfirmId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_unique() {
        assert_ne!(ConfirmId::new(), ConfirmId::new());
    }

    #[test]
    fn new_id_is_uuid_v7() {
        let id = ConfirmId::new();
        let parsed = Uuid::parse_str(id.as_str()).unwrap();
        assert_eq!(parsed.get_version_num(), 7);
    }

    #[test]
    fn serializes_as_bare_string() {
        let id = ConfirmId::from("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
        let back: ConfirmId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn opaque_strings_are_accepted() {
        let id = ConfirmId::from("not-a-uuid");
        assert_eq!(&*id, "not-a-uuid");
        assert!(id == *"not-a-uuid");
    }
}
