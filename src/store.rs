use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::capabilities::{new_session_id, SessionRecord, SessionStore};
use crate::error::{CoachError, CoachResult};

/// Merges the top-level fields of `partial` into `target`.
pub fn merge_fields(target: &mut Value, partial: Value) -> CoachResult<()> {
    let Value::Object(fields) = partial else {
        return Err(CoachError::Validation(
            "session update must be a JSON object".into(),
        ));
    };

    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(existing) = target {
        existing.extend(fields);
    }
    Ok(())
}

/// Process-local session registry. Writes hold the map's write lock for the
/// whole merge.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, user_id: &str, data: Value) -> CoachResult<String> {
        let session_id = new_session_id(user_id);
        let now = Utc::now();
        let record = SessionRecord {
            session_id: session_id.clone(),
            user_id: user_id.to_string(),
            created_at: now,
            updated_at: now,
            data,
        };
        self.sessions
            .write()
            .await
            .insert(session_id.clone(), record);
        debug!(%session_id, "created session");
        Ok(session_id)
    }

    async fn get(&self, session_id: &str) -> CoachResult<Option<SessionRecord>> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn update(&self, session_id: &str, partial: Value) -> CoachResult<bool> {
        let mut sessions = self.sessions.write().await;
        let Some(record) = sessions.get_mut(session_id) else {
            return Ok(false);
        };
        merge_fields(&mut record.data, partial)?;
        record.updated_at = Utc::now();
        Ok(true)
    }
}
