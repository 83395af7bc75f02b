use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::MAX_DISPLAY_NAME_CHARS;
use crate::error::IdentityError;

/// Store-assigned document identity of a committed message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Author identity = free-text display name, no uniqueness enforced
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SenderId(pub String);

impl SenderId {
    /// Validate a display name typed on the name-entry step.
    ///
    /// Surrounding whitespace is stripped; the remainder must be non-empty.
    pub fn from_display_name(input: &str) -> Result<Self, IdentityError> {
        let name = input.trim();
        if name.is_empty() {
            return Err(IdentityError::EmptyDisplayName);
        }
        let len = name.chars().count();
        if len > MAX_DISPLAY_NAME_CHARS {
            return Err(IdentityError::DisplayNameTooLong {
                len,
                max: MAX_DISPLAY_NAME_CHARS,
            });
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SenderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle of a live subscription, used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}
