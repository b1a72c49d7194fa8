//! Owner rows for integrations.
//!
//! Authentication lives outside this system; the store only needs a stable
//! user identifier so that `ON DELETE CASCADE` removes a user's
//! integrations together with the user.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

/// A known integration owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Identifier issued by the authentication layer.
    pub id: String,
    /// Unix timestamp of the first time this id was seen.
    pub created_at: i64,
}

/// Register `user_id` on an open connection if it is not known yet.
///
/// Meant to run inside the caller's transaction so that the owner row and
/// the row referencing it are written together.
pub fn ensure_user(conn: &Connection, user_id: &str) -> StoreResult<()> {
    if user_id.is_empty() {
        return Err(StoreError::InvalidArgument("user id must not be empty".into()));
    }
    conn.execute(
        "INSERT OR IGNORE INTO users (id, created_at) VALUES (?1, ?2)",
        params![user_id, Utc::now().timestamp()],
    )?;
    Ok(())
}

/// Lookup and removal of owner rows.
#[derive(Debug, Clone)]
pub struct UserStore {
    db: Database,
}

impl UserStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Register a user id (no-op when already present).
    #[instrument(skip(self))]
    pub async fn ensure(&self, id: &str) -> StoreResult<()> {
        let id = id.to_string();
        self.db.execute(move |conn| ensure_user(conn, &id)).await
    }

    /// Fetch a user by id, returning `None` if unknown.
    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> StoreResult<Option<User>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                let user = conn
                    .query_row(
                        "SELECT id, created_at FROM users WHERE id = ?1",
                        params![id],
                        |row| {
                            Ok(User {
                                id: row.get(0)?,
                                created_at: row.get(1)?,
                            })
                        },
                    )
                    .optional()?;
                Ok(user)
            })
            .await
    }

    /// Delete a user and, through the foreign key, all of its integrations.
    ///
    /// Returns the number of integrations removed with the user.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> StoreResult<usize> {
        let id = id.to_string();
        let removed = self
            .db
            .execute_mut(move |conn| {
                let tx = conn.transaction()?;
                let owned: i64 = tx.query_row(
                    "SELECT count(*) FROM integrations WHERE user_id = ?1",
                    params![id],
                    |row| row.get(0),
                )?;
                let deleted = tx.execute("DELETE FROM users WHERE id = ?1", params![id])?;
                if deleted == 0 {
                    return Err(StoreError::NotFound { entity: "user", id });
                }
                tx.commit()?;
                Ok(owned as usize)
            })
            .await?;

        info!(integrations = removed, "user deleted");
        Ok(removed)
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_store() -> UserStore {
        UserStore::new(Database::in_memory_migrated().await.unwrap())
    }

    #[tokio::test]
    async fn ensure_is_idempotent() {
        let store = setup_store().await;
        store.ensure("user-1").await.unwrap();
        let first = store.get("user-1").await.unwrap().unwrap();

        store.ensure("user-1").await.unwrap();
        let second = store.get("user-1").await.unwrap().unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn get_unknown_user_returns_none() {
        let store = setup_store().await;
        assert!(store.get("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_id_rejected() {
        let store = setup_store().await;
        let result = store.ensure("").await;
        assert!(matches!(result, Err(StoreError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn delete_unknown_user_returns_not_found() {
        let store = setup_store().await;
        let result = store.delete("ghost").await;
        assert!(matches!(result, Err(StoreError::NotFound { entity: "user", .. })));
    }

    #[tokio::test]
    async fn delete_reports_cascaded_integrations() {
        let db = Database::in_memory_migrated().await.unwrap();
        let store = UserStore::new(db.clone());
        store.ensure("user-1").await.unwrap();

        db.execute(|conn| {
            conn.execute(
                "INSERT INTO integrations
                 (id, user_id, provider, name, encrypted_api_key, created_at, updated_at)
                 VALUES ('i1', 'user-1', 'virustotal', 'main', 'x', 0, 0)",
                [],
            )?;
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(store.delete("user-1").await.unwrap(), 1);
        assert!(store.get("user-1").await.unwrap().is_none());
    }
}
