/// Persistent node identity.
///
/// A node keeps the same id across restarts so the directory and any
/// manifests referencing it stay valid. The id lives in `node_id.json`
/// inside the storage directory.
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MystError, Result};

const IDENTITY_FILE: &str = "node_id.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeIdentity {
    pub node_id: String,
    pub created_at: DateTime<Utc>,
}

impl NodeIdentity {
    /// Load the identity file, or mint and persist a fresh one.
    pub async fn load_or_create(storage_dir: &Path) -> Result<Self> {
        let path = storage_dir.join(IDENTITY_FILE);

        if tokio::fs::try_exists(&path).await? {
            let data = tokio::fs::read(&path).await?;
            return serde_json::from_slice(&data)
                .map_err(|e| MystError::Serialization(format!("bad {IDENTITY_FILE}: {e}")));
        }

        let identity = Self {
            node_id: Uuid::now_v7().to_string(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&identity)
            .map_err(|e| MystError::Serialization(e.to_string()))?;
        tokio::fs::write(&path, json).await?;
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_identity_stable_across_loads() {
        let dir = std::env::temp_dir().join(format!("myst-id-{}", Uuid::now_v7()));
        tokio::fs::create_dir_all(&dir).await.unwrap();

        let first = NodeIdentity::load_or_create(&dir).await.unwrap();
        let second = NodeIdentity::load_or_create(&dir).await.unwrap();
        assert_eq!(first.node_id, second.node_id);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
