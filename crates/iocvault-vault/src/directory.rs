//! User-scoped CRUD over stored integrations.
//!
//! [`IntegrationDirectory`] is the only writer of the `integrations` table.
//! Every statement filters on both the record id and the caller's user id,
//! so one user can never observe or modify another user's rows.
//!
//! # Default selection
//!
//! At most one integration per `(user, provider)` carries `is_default`.
//! Setting the flag clears it on the siblings inside the same transaction as
//! the write; a partial unique index backs this up at the storage level.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use iocvault_store::{Database, StoreError, StoreResult, ensure_user};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::encryptor::Encryptor;
use crate::error::{Result, VaultError};
use crate::model::{
    ActiveStatus, DecryptedApiKey, Integration, IntegrationPatch, IntegrationStatus,
    IntegrationSummary, ListFilter, NewIntegration, ResolvedCredential,
};

const COLUMNS: &str = "id, user_id, provider, name, encrypted_api_key, is_active, is_default, \
                       configuration, usage_count, created_at, updated_at";

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// Integration CRUD, default resolution and on-demand decryption.
#[derive(Debug, Clone)]
pub struct IntegrationDirectory {
    db: Database,
    encryptor: Arc<Encryptor>,
}

impl IntegrationDirectory {
    pub fn new(db: Database, encryptor: Arc<Encryptor>) -> Self {
        Self { db, encryptor }
    }

    /// Store a new integration with its key encrypted.
    ///
    /// When `is_default` is requested, the flag is cleared on the user's
    /// other integrations for the same provider in the insert's transaction.
    #[instrument(skip(self, new), fields(provider = %new.provider))]
    pub async fn create(&self, user_id: &str, new: NewIntegration) -> Result<IntegrationSummary> {
        new.validate()?;

        let encrypted = self.encryptor.encrypt(&new.api_key)?;
        let configuration = new
            .configuration
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let id = Uuid::now_v7().to_string();
        let user_id = user_id.to_string();
        let now = Utc::now().timestamp_millis();
        let NewIntegration {
            provider,
            name,
            is_default,
            ..
        } = new;

        let row = self
            .db
            .execute_mut(move |conn| {
                let tx = conn.transaction()?;
                ensure_user(&tx, &user_id)?;

                if is_default {
                    let cleared = clear_defaults(&tx, &user_id, &provider, None, now)?;
                    debug!(cleared, "cleared previous default");
                }

                tx.execute(
                    "INSERT INTO integrations
                     (id, user_id, provider, name, encrypted_api_key, is_active, is_default,
                      configuration, usage_count, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7, 0, ?8, ?8)",
                    params![id, user_id, provider, name, encrypted, is_default, configuration, now],
                )?;

                let row = fetch_row(&tx, &id, &user_id)?;
                tx.commit()?;
                Ok(row)
            })
            .await?;

        let integration = row.into_integration()?;
        info!(
            integration_id = %integration.id,
            is_default = integration.is_default,
            "integration created"
        );
        Ok(integration.into())
    }

    /// List a user's integrations, newest first.
    #[instrument(skip(self, filter))]
    pub async fn list(&self, user_id: &str, filter: &ListFilter) -> Result<Vec<IntegrationSummary>> {
        let user_id = user_id.to_string();
        let providers = filter.providers.clone();
        let active = filter.active_constraint();

        let rows = self
            .db
            .execute(move |conn| {
                let mut sql = format!("SELECT {COLUMNS} FROM integrations WHERE user_id = ?");
                let mut args: Vec<rusqlite::types::Value> = vec![user_id.into()];

                if !providers.is_empty() {
                    let placeholders = vec!["?"; providers.len()].join(", ");
                    sql.push_str(&format!(" AND provider IN ({placeholders})"));
                    args.extend(providers.into_iter().map(rusqlite::types::Value::from));
                }
                if let Some(active) = active {
                    sql.push_str(" AND is_active = ?");
                    args.push(active.into());
                }
                sql.push_str(" ORDER BY created_at DESC, rowid DESC");

                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(args), read_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            let integration = row.into_integration()?;
            if filter.matches_search(&integration) {
                summaries.push(integration.into());
            }
        }

        debug!(count = summaries.len(), "listed integrations");
        Ok(summaries)
    }

    /// A user's active integrations, newest first.
    pub async fn list_active(&self, user_id: &str) -> Result<Vec<IntegrationSummary>> {
        let filter = ListFilter {
            statuses: vec![ActiveStatus::Active],
            ..ListFilter::default()
        };
        self.list(user_id, &filter).await
    }

    /// Fetch one integration owned by `user_id`.
    ///
    /// # Errors
    ///
    /// [`VaultError::NotFound`] when the id is unknown or owned by another user.
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: &str, user_id: &str) -> Result<IntegrationSummary> {
        Ok(self.get_record(id, user_id).await?.into())
    }

    /// Fetch the full record (configuration included) for one integration.
    pub async fn get_record(&self, id: &str, user_id: &str) -> Result<Integration> {
        self.load(id, user_id).await?.into_integration()
    }

    /// Pick the integration to use when the caller did not pin one.
    ///
    /// Order: the active default; otherwise the oldest active integration;
    /// otherwise `None`. The key is decrypted on the way out.
    #[instrument(skip(self))]
    pub async fn get_default_or_fallback(
        &self,
        provider: &str,
        user_id: &str,
    ) -> Result<Option<ResolvedCredential>> {
        match self.default_row(provider, user_id).await? {
            Some(row) => Ok(Some(self.resolve(row)?)),
            None => Ok(None),
        }
    }

    /// The same selection as [`IntegrationDirectory::get_default_or_fallback`]
    /// without touching the key.
    #[instrument(skip(self))]
    pub async fn default_integration(
        &self,
        provider: &str,
        user_id: &str,
    ) -> Result<Option<Integration>> {
        self.default_row(provider, user_id)
            .await?
            .map(IntegrationRow::into_integration)
            .transpose()
    }

    /// Report whether `provider` has a usable integration for the user.
    pub async fn status(&self, provider: &str, user_id: &str) -> Result<Option<IntegrationStatus>> {
        let resolved = self.get_default_or_fallback(provider, user_id).await?;
        Ok(resolved.map(|resolved| IntegrationStatus {
            provider: provider.to_string(),
            is_active: resolved.integration.is_active,
            has_api_key: !resolved.api_key.is_empty(),
        }))
    }

    /// Apply `patch` to one integration.
    ///
    /// The key is re-encrypted only when the new plaintext differs from
    /// the stored one. Setting `is_default` clears it on the siblings in the
    /// same transaction.
    #[instrument(skip(self, patch))]
    pub async fn update(
        &self,
        id: &str,
        user_id: &str,
        patch: IntegrationPatch,
    ) -> Result<IntegrationSummary> {
        patch.validate()?;

        let current = self.load(id, user_id).await?;
        let encrypted = match patch.api_key.as_deref() {
            Some(new_key) => self.reencrypt_if_changed(&current, new_key)?,
            None => None,
        };

        let IntegrationPatch {
            name,
            is_active,
            is_default,
            configuration,
            ..
        } = patch;
        let configuration = configuration
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let id = id.to_string();
        let user_id = user_id.to_string();
        let provider = current.provider.clone();
        let now = Utc::now().timestamp_millis();

        let row = self
            .db
            .execute_mut(move |conn| {
                let tx = conn.transaction()?;

                if is_default == Some(true) {
                    clear_defaults(&tx, &user_id, &provider, Some(&id), now)?;
                }

                let updated = tx.execute(
                    "UPDATE integrations SET
                        name              = COALESCE(?3, name),
                        encrypted_api_key = COALESCE(?4, encrypted_api_key),
                        is_active         = COALESCE(?5, is_active),
                        is_default        = COALESCE(?6, is_default),
                        configuration     = COALESCE(?7, configuration),
                        updated_at        = ?8
                     WHERE id = ?1 AND user_id = ?2",
                    params![id, user_id, name, encrypted, is_active, is_default, configuration, now],
                )?;
                if updated == 0 {
                    return Err(not_found(&id));
                }

                let row = fetch_row(&tx, &id, &user_id)?;
                tx.commit()?;
                Ok(row)
            })
            .await?;

        let integration = row.into_integration()?;
        info!(integration_id = %integration.id, "integration updated");
        Ok(integration.into())
    }

    /// Permanently delete one integration.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str, user_id: &str) -> Result<()> {
        let id = id.to_string();
        let user_id = user_id.to_string();

        self.db
            .execute(move |conn| {
                let deleted = conn.execute(
                    "DELETE FROM integrations WHERE id = ?1 AND user_id = ?2",
                    params![id, user_id],
                )?;
                if deleted == 0 {
                    return Err(not_found(&id));
                }
                Ok(())
            })
            .await?;

        info!("integration deleted");
        Ok(())
    }

    /// Flip `is_active`. The default flag is left as it is.
    #[instrument(skip(self))]
    pub async fn toggle_active(&self, id: &str, user_id: &str) -> Result<IntegrationSummary> {
        let id = id.to_string();
        let user_id = user_id.to_string();
        let now = Utc::now().timestamp_millis();

        let row = self
            .db
            .execute(move |conn| {
                let updated = conn.execute(
                    "UPDATE integrations SET is_active = NOT is_active, updated_at = ?3
                     WHERE id = ?1 AND user_id = ?2",
                    params![id, user_id, now],
                )?;
                if updated == 0 {
                    return Err(not_found(&id));
                }
                fetch_row(conn, &id, &user_id)
            })
            .await?;

        let integration = row.into_integration()?;
        info!(is_active = integration.is_active, "integration toggled");
        Ok(integration.into())
    }

    /// Decrypt the stored key of one integration.
    ///
    /// Does not look at `is_active`; this is the owner-facing reveal. The
    /// dispatch path uses [`active_credential`](Self::active_credential).
    #[instrument(skip(self))]
    pub async fn get_decrypted_api_key(&self, id: &str, user_id: &str) -> Result<String> {
        let row = self.load(id, user_id).await?;
        self.decrypt_row(&row)
    }

    /// Decrypt the stored key and return it with its integration id and provider.
    #[instrument(skip(self))]
    pub async fn get_decrypted_api_key_with_details(
        &self,
        id: &str,
        user_id: &str,
    ) -> Result<DecryptedApiKey> {
        let row = self.load(id, user_id).await?;
        let api_key = self.decrypt_row(&row)?;
        Ok(DecryptedApiKey {
            api_key,
            integration_id: row.id,
            provider: row.provider,
        })
    }

    /// Resolve a pinned integration for an outbound call.
    ///
    /// # Errors
    ///
    /// [`VaultError::NotFound`] for an unknown id, [`VaultError::Inactive`]
    /// for a deactivated integration, [`VaultError::DecryptionFailed`] for
    /// an unreadable envelope.
    #[instrument(skip(self))]
    pub async fn active_credential(&self, id: &str, user_id: &str) -> Result<ResolvedCredential> {
        let row = self.load(id, user_id).await?;
        if !row.is_active {
            return Err(VaultError::Inactive { id: row.id });
        }
        self.resolve(row)
    }

    /// Count one successful outbound call against an integration.
    #[instrument(skip(self))]
    pub async fn record_usage(&self, id: &str, user_id: &str) -> Result<()> {
        let id = id.to_string();
        let user_id = user_id.to_string();

        self.db
            .execute(move |conn| {
                let updated = conn.execute(
                    "UPDATE integrations SET usage_count = usage_count + 1
                     WHERE id = ?1 AND user_id = ?2",
                    params![id, user_id],
                )?;
                if updated == 0 {
                    return Err(not_found(&id));
                }
                Ok(())
            })
            .await?;

        Ok(())
    }

    // -- Internal helpers ---------------------------------------------------

    async fn default_row(&self, provider: &str, user_id: &str) -> Result<Option<IntegrationRow>> {
        let provider = provider.to_string();
        let user_id = user_id.to_string();

        let row = self
            .db
            .execute(move |conn| {
                let row = conn
                    .query_row(
                        &format!(
                            "SELECT {COLUMNS} FROM integrations
                             WHERE user_id = ?1 AND provider = ?2 AND is_active = 1
                             ORDER BY is_default DESC, created_at ASC, rowid ASC
                             LIMIT 1"
                        ),
                        params![user_id, provider],
                        read_row,
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;
        Ok(row)
    }

    async fn load(&self, id: &str, user_id: &str) -> Result<IntegrationRow> {
        let id = id.to_string();
        let user_id = user_id.to_string();
        let row = self
            .db
            .execute(move |conn| fetch_row(conn, &id, &user_id))
            .await?;
        Ok(row)
    }

    fn resolve(&self, row: IntegrationRow) -> Result<ResolvedCredential> {
        let api_key = self.decrypt_row(&row)?;
        Ok(ResolvedCredential {
            integration: row.into_integration()?,
            api_key,
        })
    }

    fn decrypt_row(&self, row: &IntegrationRow) -> Result<String> {
        self.encryptor.decrypt(&row.encrypted_api_key).inspect_err(|e| {
            warn!(integration_id = %row.id, error = %e, "stored API key could not be decrypted");
        })
    }

    /// Returns the new envelope, or `None` when the key is unchanged.
    ///
    /// An envelope that no longer opens (e.g. after a master-key change) is
    /// replaced rather than blocking the update.
    fn reencrypt_if_changed(&self, row: &IntegrationRow, new_key: &str) -> Result<Option<String>> {
        match self.encryptor.decrypt(&row.encrypted_api_key) {
            Ok(current) if current == new_key => {
                debug!("API key unchanged, keeping envelope");
                Ok(None)
            }
            Ok(_) => Ok(Some(self.encryptor.encrypt(new_key)?)),
            Err(e) => {
                warn!(integration_id = %row.id, error = %e, "replacing unreadable API key");
                Ok(Some(self.encryptor.encrypt(new_key)?))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SQL helpers
// ---------------------------------------------------------------------------

fn not_found(id: &str) -> StoreError {
    StoreError::NotFound {
        entity: "integration",
        id: id.to_string(),
    }
}

fn fetch_row(conn: &Connection, id: &str, user_id: &str) -> StoreResult<IntegrationRow> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM integrations WHERE id = ?1 AND user_id = ?2"),
        params![id, user_id],
        read_row,
    )
    .optional()?
    .ok_or_else(|| not_found(id))
}

/// Clear `is_default` on the user's integrations for `provider`, except `keep`.
fn clear_defaults(
    conn: &Connection,
    user_id: &str,
    provider: &str,
    keep: Option<&str>,
    now: i64,
) -> StoreResult<usize> {
    let cleared = conn.execute(
        "UPDATE integrations SET is_default = 0, updated_at = ?4
         WHERE user_id = ?1 AND provider = ?2 AND is_default = 1 AND id != ?3",
        params![user_id, provider, keep.unwrap_or(""), now],
    )?;
    Ok(cleared)
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<IntegrationRow> {
    Ok(IntegrationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        provider: row.get(2)?,
        name: row.get(3)?,
        encrypted_api_key: row.get(4)?,
        is_active: row.get(5)?,
        is_default: row.get(6)?,
        configuration: row.get(7)?,
        usage_count: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

// ---------------------------------------------------------------------------
// Internal row type (keeps rusqlite and the envelope out of the public API)
// ---------------------------------------------------------------------------

struct IntegrationRow {
    id: String,
    user_id: String,
    provider: String,
    name: String,
    encrypted_api_key: String,
    is_active: bool,
    is_default: bool,
    configuration: Option<String>,
    usage_count: i64,
    created_at: i64,
    updated_at: i64,
}

impl IntegrationRow {
    fn into_integration(self) -> Result<Integration> {
        let configuration = self
            .configuration
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(Integration {
            id: self.id,
            user_id: self.user_id,
            provider: self.provider,
            name: self.name,
            is_active: self.is_active,
            is_default: self.is_default,
            configuration,
            usage_count: self.usage_count.max(0) as u64,
            created_at: DateTime::from_timestamp_millis(self.created_at).unwrap_or_default(),
            updated_at: DateTime::from_timestamp_millis(self.updated_at).unwrap_or_default(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
