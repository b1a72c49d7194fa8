//! # iocvault-store
//!
//! SQLite persistence for the IOC vault.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  UserStore (owner rows, cascade delete) │
//! ├─────────────────────────────────────────┤
//! │  Database (rusqlite WAL, spawn_blocking)│
//! │  Migrations (versioned, transactional)  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Integration rows are written by `iocvault-vault`, which owns the
//! encryption of API keys; this crate only provides the connection, the
//! schema and the owner rows.
//!
//! ## Quick start
//!
//! ```ignore
//! use iocvault_store::{Database, UserStore};
//!
//! let db = Database::open_and_migrate("data/iocvault.db").await?;
//! let users = UserStore::new(db.clone());
//! ```

pub mod db;
pub mod error;
pub mod migration;
pub mod user_store;

// ── re-exports ───────────────────────────────────────────────────────

pub use db::Database;
pub use error::{StoreError, StoreResult};
pub use user_store::{User, UserStore, ensure_user};
