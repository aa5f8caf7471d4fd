//! Artifacts produced by task execution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ids::generate_id;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub content: String,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub task_id: String,
    pub checksum: String,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Artifact {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, content: impl Into<String>, task_id: impl Into<String>) -> Self {
        let name = name.into();
        let content = content.into();
        let now = Utc::now();
        let checksum = checksum_of(&content);
        Self {
            id: generate_id("artifact", &name),
            name,
            kind: kind.into(),
            content,
            version: 1,
            created_at: now,
            updated_at: now,
            task_id: task_id.into(),
            checksum,
            metadata: HashMap::new(),
        }
    }

    /// Replace content, bumping version and recomputing the checksum.
    pub fn update_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.checksum = checksum_of(&self.content);
        self.version += 1;
        self.updated_at = Utc::now();
    }
}

fn checksum_of(content: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(content.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_artifact_has_checksum_and_version_one() {
        let artifact = Artifact::new("readme", "doc", "hello", "task-1");
        assert_eq!(artifact.version, 1);
        assert_eq!(artifact.checksum.len(), 64);
        assert_eq!(artifact.task_id, "task-1");
    }

    #[test]
    fn update_content_bumps_version_and_checksum() {
        let mut artifact = Artifact::new("readme", "doc", "hello", "task-1");
        let original_checksum = artifact.checksum.clone();
        artifact.update_content("goodbye");
        assert_eq!(artifact.version, 2);
        assert_ne!(artifact.checksum, original_checksum);
    }

    #[test]
    fn checksum_is_deterministic() {
        let a = Artifact::new("a", "doc", "same content", "t");
        let b = Artifact::new("b", "doc", "same content", "t");
        assert_eq!(a.checksum, b.checksum);
    }
}
