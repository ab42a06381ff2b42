use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use crate::capabilities::{new_session_id, SessionRecord, SessionStore};
use crate::error::{CoachError, CoachResult};

pub async fn connect(database_url: &str) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn registry_error(err: sqlx::Error) -> CoachError {
    CoachError::Registry(err.to_string())
}

/// Session registry backed by `study_coach.sessions`. Updates merge in a
/// single statement, so concurrent writers never lose each other's fields.
#[derive(Debug, Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, user_id: &str, data: Value) -> CoachResult<String> {
        let session_id = new_session_id(user_id);
        sqlx::query(
            r#"
            INSERT INTO study_coach.sessions (id, user_id, data)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(&session_id)
        .bind(user_id)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(registry_error)?;

        Ok(session_id)
    }

    async fn get(&self, session_id: &str) -> CoachResult<Option<SessionRecord>> {
        let row = sqlx::query(
            "SELECT id, user_id, created_at, updated_at, data \
             FROM study_coach.sessions WHERE id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(registry_error)?;

        Ok(row.map(|row| SessionRecord {
            session_id: row.get("id"),
            user_id: row.get("user_id"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            data: row.get("data"),
        }))
    }

    async fn update(&self, session_id: &str, partial: Value) -> CoachResult<bool> {
        if !partial.is_object() {
            return Err(CoachError::Validation(
                "session update must be a JSON object".into(),
            ));
        }

        let result = sqlx::query(
            r#"
            UPDATE study_coach.sessions
            SET data = data || $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(session_id)
        .bind(partial)
        .execute(&self.pool)
        .await
        .map_err(registry_error)?;

        Ok(result.rows_affected() > 0)
    }
}
