use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::{AccountId, SourceTag};

/// A mirrored account. Owned by configuration and immutable after load.
#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Local handle, used in actor URLs and WebFinger.
    pub username: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub summary: String,
    /// Earliest post to mirror when nothing has been stored yet.
    pub start_date: DateTime<Utc>,
    pub source: SourceAccount,
}

#[derive(Clone, Deserialize)]
pub struct SourceAccount {
    #[serde(default = "default_source_kind")]
    pub kind: SourceTag,
    pub handle: String,
    pub token: String,
}

fn default_source_kind() -> SourceTag {
    SourceTag::Twitter
}

impl fmt::Debug for SourceAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceAccount")
            .field("kind", &self.kind)
            .field("handle", &self.handle)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_token() {
        let source = SourceAccount {
            kind: SourceTag::Twitter,
            handle: "alice_src".into(),
            token: "secret-token".into(),
        };
        let printed = format!("{:?}", source);
        assert!(printed.contains("alice_src"));
        assert!(!printed.contains("secret-token"));
    }
}
