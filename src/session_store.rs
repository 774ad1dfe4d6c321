//! Durable chat-id → conversation-state mapping
//!
//! One row per chat. Reads and writes are single-key and atomic; the
//! controller relies on "the stored state only moves when a handler
//! succeeds", so [`SessionStore::set`] is the only way state changes.
//!
//! `PgSessionStore` is the production implementation. `MemorySessionStore`
//! backs tests and local development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sqlx::postgres::PgPool;
use sqlx::types::Json;
use sqlx::Row;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::errors::BotResult;
use crate::state::{Scratch, Session, StateName};

/// Storage seam for per-chat conversation state.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch the session for a chat. `None` means the chat has never
    /// completed `/start`.
    async fn get(&self, chat_id: i64) -> BotResult<Option<Session>>;

    /// Write a chat's state and scratch, creating the row if absent.
    async fn set(&self, chat_id: i64, state: StateName, scratch: &Scratch) -> BotResult<()>;
}

/// Initialize the session schema
pub async fn init_session_schema(pool: &PgPool) -> anyhow::Result<()> {
    use anyhow::Context;

    info!("Initializing session schema");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS sessions (
            chat_id BIGINT PRIMARY KEY,
            state VARCHAR(32) NOT NULL,
            scratch JSONB NOT NULL DEFAULT '{}'::jsonb,
            created_at TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create sessions table")?;

    info!("Session schema initialized successfully");
    Ok(())
}

/// PostgreSQL-backed session store.
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
    async fn get(&self, chat_id: i64) -> BotResult<Option<Session>> {
        let row = sqlx::query("SELECT state, scratch, updated_at FROM sessions WHERE chat_id = $1")
            .bind(chat_id)
            .fetch_optional(&self.pool)
            .await?;

        let row = match row {
            Some(row) => row,
            None => {
                debug!(chat_id = %chat_id, "No session found");
                return Ok(None);
            }
        };

        let stored: String = row.get(0);
        let state = match StateName::parse(&stored) {
            Some(state) => state,
            None => {
                return Err(crate::errors::BotError::UnknownState {
                    chat_id,
                    state: stored,
                })
            }
        };

        let scratch: Json<Scratch> = row.get(1);
        let updated_at: DateTime<Utc> = row.get(2);
        debug!(chat_id = %chat_id, state = %state, updated_at = %updated_at, "Session found");

        Ok(Some(Session {
            chat_id,
            state,
            scratch: scratch.0,
        }))
    }

    async fn set(&self, chat_id: i64, state: StateName, scratch: &Scratch) -> BotResult<()> {
        sqlx::query(
            "INSERT INTO sessions (chat_id, state, scratch, updated_at)
             VALUES ($1, $2, $3, CURRENT_TIMESTAMP)
             ON CONFLICT (chat_id)
             DO UPDATE SET state = EXCLUDED.state,
                           scratch = EXCLUDED.scratch,
                           updated_at = CURRENT_TIMESTAMP",
        )
        .bind(chat_id)
        .bind(state.as_str())
        .bind(Json(scratch))
        .execute(&self.pool)
        .await?;

        debug!(chat_id = %chat_id, state = %state, "Session written");
        Ok(())
    }
}

/// In-memory session store for tests and local development.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<i64, (StateName, Scratch)>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of chats with a stored session.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, chat_id: i64) -> BotResult<Option<Session>> {
        let sessions = self.sessions.lock();
        Ok(sessions.get(&chat_id).map(|(state, scratch)| Session {
            chat_id,
            state: *state,
            scratch: scratch.clone(),
        }))
    }

    async fn set(&self, chat_id: i64, state: StateName, scratch: &Scratch) -> BotResult<()> {
        self.sessions
            .lock()
            .insert(chat_id, (state, scratch.clone()));
        Ok(())
    }
}
