use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-member view state for one conversation.
///
/// Stored encrypted and addressed by a blinded key, never by the plaintext
/// (conversation, member) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberMetadata {
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub last_read: Option<DateTime<Utc>>,
    #[serde(default)]
    pub category: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_default() {
        let meta: MemberMetadata = serde_json::from_str(r#"{"archived":true}"#).unwrap();
        assert!(meta.archived);
        assert!(!meta.pinned);
        assert_eq!(meta.category, None);
    }
}
