//! XpStore Trait - Experience Ledger
//!
//! Append-only XP grants plus the owner's achievement rows. Like
//! [`TreeStore`](crate::db::TreeStore), every read is scoped by owner.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::db::tree_store::StoreResult;
use crate::models::XpGrant;

#[async_trait]
pub trait XpStore: Send + Sync {
    /// Append one grant
    async fn record(&self, grant: XpGrant) -> StoreResult<()>;

    /// Sum of every grant recorded for `owner_id`
    async fn total_xp(&self, owner_id: &str) -> StoreResult<i64>;

    /// Achievement rows unlocked by `owner_id`
    async fn achievements(&self, owner_id: &str) -> StoreResult<Vec<Value>>;
}

/// XP ledger held in memory
#[derive(Debug, Default)]
pub struct InMemoryXpStore {
    grants: RwLock<Vec<XpGrant>>,
    achievements: RwLock<HashMap<String, Vec<Value>>>,
}

impl InMemoryXpStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants recorded for `owner_id`, oldest first
    pub async fn grants(&self, owner_id: &str) -> Vec<XpGrant> {
        self.grants
            .read()
            .await
            .iter()
            .filter(|g| g.user_id == owner_id)
            .cloned()
            .collect()
    }

    pub async fn unlock(&self, owner_id: &str, achievement: Value) {
        self.achievements
            .write()
            .await
            .entry(owner_id.to_string())
            .or_default()
            .push(achievement);
    }
}

#[async_trait]
impl XpStore for InMemoryXpStore {
    async fn record(&self, grant: XpGrant) -> StoreResult<()> {
        self.grants.write().await.push(grant);
        Ok(())
    }

    async fn total_xp(&self, owner_id: &str) -> StoreResult<i64> {
        Ok(self
            .grants
            .read()
            .await
            .iter()
            .filter(|g| g.user_id == owner_id)
            .map(|g| g.xp_amount)
            .sum())
    }

    async fn achievements(&self, owner_id: &str) -> StoreResult<Vec<Value>> {
        Ok(self
            .achievements
            .read()
            .await
            .get(owner_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_totals_are_per_owner() {
        let store = InMemoryXpStore::new();
        store.record(XpGrant::task_completed("u1")).await.unwrap();
        store.record(XpGrant::task_completed("u1")).await.unwrap();
        store.record(XpGrant::task_completed("u2")).await.unwrap();
        store.unlock("u1", json!({ "name": "first_task" })).await;

        assert_eq!(store.total_xp("u1").await.unwrap(), 20);
        assert_eq!(store.total_xp("u2").await.unwrap(), 10);
        assert_eq!(store.total_xp("u3").await.unwrap(), 0);
        assert_eq!(store.achievements("u1").await.unwrap().len(), 1);
        assert!(store.achievements("u2").await.unwrap().is_empty());
    }
}
