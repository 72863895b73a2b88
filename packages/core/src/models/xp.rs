//! Experience Points
//!
//! Completing a checklist task earns the owner a fixed amount of XP. Grants
//! are an append-only ledger; the total and the derived level are computed on
//! read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// XP earned by ticking one checklist task
pub const TASK_COMPLETED_XP: i64 = 10;

/// XP needed per level
pub const XP_PER_LEVEL: i64 = 100;

pub const TASK_COMPLETED_ACTION: &str = "task_completed";

/// One ledger row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XpGrant {
    pub user_id: String,
    pub xp_amount: i64,
    pub action: String,
    pub timestamp: DateTime<Utc>,
}

impl XpGrant {
    pub fn task_completed(owner_id: impl Into<String>) -> Self {
        Self {
            user_id: owner_id.into(),
            xp_amount: TASK_COMPLETED_XP,
            action: TASK_COMPLETED_ACTION.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Level for a total: `floor(xp / 100) + 1`, never below 1
pub fn level_for(xp: i64) -> i64 {
    xp.max(0) / XP_PER_LEVEL + 1
}

/// Owner's XP total, level and unlocked achievements
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct XpSummary {
    pub xp: i64,
    pub level: i64,
    /// Achievement rows as stored; their shape is owned by the client
    pub achievements: Vec<Value>,
}

impl XpSummary {
    pub fn new(xp: i64, achievements: Vec<Value>) -> Self {
        Self {
            xp,
            level: level_for(xp),
            achievements,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_boundaries() {
        assert_eq!(level_for(0), 1);
        assert_eq!(level_for(99), 1);
        assert_eq!(level_for(100), 2);
        assert_eq!(level_for(250), 3);
        assert_eq!(level_for(-20), 1);
    }

    #[test]
    fn test_task_grant() {
        let grant = XpGrant::task_completed("u1");
        assert_eq!(grant.xp_amount, 10);
        assert_eq!(grant.action, "task_completed");
        assert_eq!(XpSummary::new(30, Vec::new()).level, 1);
    }
}
