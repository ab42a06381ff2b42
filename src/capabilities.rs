//! Contracts for the collaborators the core depends on but does not own.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoachResult;
use crate::models::{LearningLevel, Resource, ResourceKind};

/// Hosted language model. Output format is not guaranteed.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> CoachResult<String>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct LookupConstraints {
    pub level: LearningLevel,
    pub kinds: Vec<ResourceKind>,
}

/// Resource search. "No results" is an empty list, not an error.
#[async_trait]
pub trait ResourceLookup: Send + Sync {
    async fn find(&self, topic: &str, constraints: &LookupConstraints)
        -> CoachResult<Vec<Resource>>;
}

/// Study material such as extracted textbook text.
#[async_trait]
pub trait TextSupplier: Send + Sync {
    async fn text(&self) -> CoachResult<String>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub data: Value,
}

/// Session registry keyed by session id, last writer wins.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, user_id: &str, data: Value) -> CoachResult<String>;

    /// `Ok(None)` when the session does not exist.
    async fn get(&self, session_id: &str) -> CoachResult<Option<SessionRecord>>;

    /// Merges the fields of `partial` into the stored data. Returns `false`
    /// when the session does not exist.
    async fn update(&self, session_id: &str, partial: Value) -> CoachResult<bool>;
}

pub fn new_session_id(user_id: &str) -> String {
    format!("session_{}_{}", user_id, uuid::Uuid::new_v4().simple())
}
