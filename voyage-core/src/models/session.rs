use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque conversation scope at the agent provider. Never validated or stored here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Use the caller's identifier, or mint a UUID when none (or an empty one) was given.
    pub fn resolve(supplied: Option<String>) -> Self {
        match supplied {
            Some(id) if !id.trim().is_empty() => Self(id),
            _ => Self::generate(),
        }
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supplied_id_is_kept_verbatim() {
        let id = SessionId::resolve(Some("not-a-uuid".to_string()));
        assert_eq!(id.as_str(), "not-a-uuid");
    }

    #[test]
    fn test_missing_or_blank_id_gets_uuid() {
        for supplied in [None, Some(String::new()), Some("  ".to_string())] {
            let id = SessionId::resolve(supplied);
            assert!(Uuid::parse_str(id.as_str()).is_ok(), "expected uuid, got {}", id);
        }
    }
}
