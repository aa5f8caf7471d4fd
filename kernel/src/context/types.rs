//! Context item and tier types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::generate_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Constraint,
    Definition,
    Artifact,
    Summary,
    Memory,
    Instruction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierName {
    Pinned,
    Working,
    Longterm,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextItem {
    pub id: String,
    pub content: String,
    pub kind: ItemKind,
    pub source: String,
    pub tokens: u32,
    pub priority: u8,
    pub created_at: DateTime<Utc>,
    pub accessed_at: DateTime<Utc>,
    pub access_count: u32,
    pub embedding: Option<Vec<f32>>,
}

impl ContextItem {
    pub fn new(content: impl Into<String>, kind: ItemKind, source: impl Into<String>, priority: u8) -> Self {
        let content = content.into();
        let tokens = estimate_tokens(&content);
        let now = Utc::now();
        Self {
            id: generate_id("ctx", &content),
            content,
            kind,
            source: source.into(),
            tokens,
            priority,
            created_at: now,
            accessed_at: now,
            access_count: 0,
            embedding: None,
        }
    }
}

/// Whitespace-word-count token estimate; deterministic and dependency-free.
pub fn estimate_tokens(content: &str) -> u32 {
    content.split_whitespace().count() as u32
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextTier {
    pub name: TierName,
    pub items: Vec<ContextItem>,
    pub max_tokens: u32,
    pub current_tokens: u32,
}

impl ContextTier {
    pub fn new(name: TierName, max_tokens: u32) -> Self {
        Self {
            name,
            items: Vec::new(),
            max_tokens,
            current_tokens: 0,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.max_tokens.saturating_sub(self.current_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_tokens_counts_words() {
        assert_eq!(estimate_tokens("one two three"), 3);
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn context_item_new_sets_token_count() {
        let item = ContextItem::new("hello world", ItemKind::Memory, "test", 50);
        assert_eq!(item.tokens, 2);
        assert_eq!(item.access_count, 0);
    }

    #[test]
    fn context_tier_remaining_is_cap_minus_current() {
        let mut tier = ContextTier::new(TierName::Working, 100);
        tier.current_tokens = 40;
        assert_eq!(tier.remaining(), 60);
    }
}
