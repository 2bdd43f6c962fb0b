//! Per-user bounded conversation history, used as context for intent extraction.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

/// Maximum turns kept per user. Oldest are evicted first.
pub const MAX_STORED_TURNS: usize = 50;

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One message in a user's conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

type History = Arc<Mutex<VecDeque<ConversationTurn>>>;

/// In-memory conversation store keyed by user id (WhatsApp wa_id).
///
/// Each user's history sits behind its own lock, so appends and reads for one
/// user are serialized while different users never contend.
#[derive(Default)]
pub struct ConversationStore {
    users: RwLock<HashMap<String, History>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn history(&self, user: &str) -> History {
        if let Some(history) = self.users.read().await.get(user) {
            return Arc::clone(history);
        }
        let mut users = self.users.write().await;
        Arc::clone(users.entry(user.to_string()).or_default())
    }

    /// Append a turn for `user`, evicting the oldest beyond `MAX_STORED_TURNS`.
    pub async fn append(&self, user: &str, role: TurnRole, content: impl Into<String>) {
        let history = self.history(user).await;
        let mut turns = history.lock().await;
        turns.push_back(ConversationTurn {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        });
        while turns.len() > MAX_STORED_TURNS {
            turns.pop_front();
        }
    }

    /// The most recent `limit` turns for `user`, oldest first.
    pub async fn recent(&self, user: &str, limit: usize) -> Vec<ConversationTurn> {
        let history = self.history(user).await;
        let turns = history.lock().await;
        let skip = turns.len().saturating_sub(limit);
        turns.iter().skip(skip).cloned().collect()
    }

    /// Number of users with a history.
    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }
}
