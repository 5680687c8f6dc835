//! # parley-store
//!
//! Persistent message log and group roster for the Parley hub, backed by
//! SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle with typed CRUD
//! helpers for every collection, and [`SqliteStore`], which implements the
//! async collection traits consumed by the hub ([`MessageStore`],
//! [`GroupStore`], [`UserDirectory`]) by running those helpers on the
//! blocking thread pool.

pub mod database;
pub mod groups;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod store;
pub mod users;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
pub use store::{GroupStore, MessageStore, SqliteStore, UserDirectory};
