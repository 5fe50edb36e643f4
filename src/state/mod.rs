//! Session-context storage
//!
//! Contexts live behind a simple get/put/remove-by-id contract so the
//! backend is swappable: in-memory for development and tests, Postgres
//! for deployments that need sessions to survive restarts.

use crate::error::OrchestrationError;
use crate::models::SessionContext;
use crate::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};

/// Trait for session-context persistence
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, session_id: &str) -> Result<Option<SessionContext>>;
    async fn save(&self, context: SessionContext) -> Result<()>;
    async fn remove(&self, session_id: &str) -> Result<()>;
}

//
// ================= In-Memory Backend =================
//

/// In-memory session store for development and tests
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionContext>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<SessionContext>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).cloned())
    }

    async fn save(&self, context: SessionContext) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(context.session_id.clone(), context);
        Ok(())
    }

    async fn remove(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(session_id);
        Ok(())
    }
}

//
// ================= Postgres Backend =================
//

/// Postgres-backed session store; the schema is created on first use.
pub struct PostgresSessionStore {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

impl PostgresSessionStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| {
                OrchestrationError::ContextStorage(format!(
                    "Failed to connect to session database: {}",
                    e
                ))
            })?;

        Ok(Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        })
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        }
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS session_contexts (
                      session_id TEXT PRIMARY KEY,
                      context TEXT NOT NULL,
                      updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                OrchestrationError::ContextStorage(format!(
                    "Failed to initialize session schema: {}",
                    e
                ))
            })?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionStore for PostgresSessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<SessionContext>> {
        self.ensure_schema().await?;

        let row = sqlx::query("SELECT context FROM session_contexts WHERE session_id = $1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                OrchestrationError::ContextStorage(format!("Failed to load session: {}", e))
            })?;

        match row {
            Some(row) => {
                let raw: String = row.try_get("context").map_err(|e| {
                    OrchestrationError::ContextStorage(format!("Malformed session row: {}", e))
                })?;
                let context = serde_json::from_str(&raw)?;
                Ok(Some(context))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, context: SessionContext) -> Result<()> {
        self.ensure_schema().await?;

        let raw = serde_json::to_string(&context)?;

        sqlx::query(
            r#"
            INSERT INTO session_contexts (session_id, context, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (session_id)
            DO UPDATE SET context = EXCLUDED.context, updated_at = NOW()
            "#,
        )
        .bind(&context.session_id)
        .bind(&raw)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            OrchestrationError::ContextStorage(format!("Failed to save session: {}", e))
        })?;

        Ok(())
    }

    async fn remove(&self, session_id: &str) -> Result<()> {
        self.ensure_schema().await?;

        sqlx::query("DELETE FROM session_contexts WHERE session_id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                OrchestrationError::ContextStorage(format!("Failed to remove session: {}", e))
            })?;

        Ok(())
    }
}
