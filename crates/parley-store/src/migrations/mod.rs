//! Schema migrations, tracked with `PRAGMA user_version`.
//!
//! Each entry in [`MIGRATIONS`] is applied at most once, in order, inside
//! its own transaction together with the version bump.

pub mod v001_initial;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

type Migration = fn(&Connection) -> rusqlite::Result<()>;

/// `(version, name, up)`. Append only.
const MIGRATIONS: &[(u32, &str, Migration)] = &[(1, "v001_initial", v001_initial::up)];

pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    let target = MIGRATIONS.last().map(|(version, _, _)| *version).unwrap_or(0);

    if current > target {
        return Err(StoreError::Migration(format!(
            "database schema v{current} is newer than this build (v{target})"
        )));
    }

    for &(version, name, up) in MIGRATIONS.iter().filter(|(v, _, _)| *v > current) {
        tracing::info!(version, name, "applying migration");
        let tx = conn.unchecked_transaction()?;
        up(&tx).map_err(|e| StoreError::Migration(format!("{name}: {e}")))?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
    }

    Ok(())
}
