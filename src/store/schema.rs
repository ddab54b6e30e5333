//! Schema migrations and the migration floor.
//!
//! Databases created before the content hash column existed cannot be
//! upgraded in place. They are dropped and rebuilt, which costs a full sync
//! but never leaves the store half-migrated.

use rusqlite::Connection;
use rusqlite_migration::{Migrations, M};

use crate::app::Result;

const MIGRATIONS: [&str; 3] = [
    include_str!("../../migrations/001-initial/up.sql"),
    include_str!("../../migrations/002-content-hash/up.sql"),
    include_str!("../../migrations/003-pager-window/up.sql"),
];

/// Schema version written by the newest migration.
pub const SCHEMA_VERSION: i64 = MIGRATIONS.len() as i64;

/// Oldest schema version that is migrated instead of wiped.
pub const MIN_MIGRATABLE_VERSION: i64 = 2;

fn migrations() -> Migrations<'static> {
    Migrations::new(MIGRATIONS.into_iter().map(M::up).collect())
}

/// Bring a freshly opened connection to the current schema.
pub(crate) fn prepare(conn: &mut Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    let version = user_version(conn)?;
    if version > 0 && !(MIN_MIGRATABLE_VERSION..=SCHEMA_VERSION).contains(&version) {
        tracing::warn!(
            "Database schema version {} cannot be migrated to {}, recreating it",
            version,
            SCHEMA_VERSION
        );
        wipe(conn)?;
    }

    migrations().to_latest(conn)?;
    Ok(())
}

pub(crate) fn user_version(conn: &Connection) -> Result<i64> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

fn wipe(conn: &mut Connection) -> Result<()> {
    let tables: Vec<String> = {
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        )?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<_>>()?
    };

    conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
    let tx = conn.transaction()?;
    for table in &tables {
        tx.execute_batch(&format!("DROP TABLE IF EXISTS \"{}\";", table))?;
    }
    tx.pragma_update(None, "user_version", 0)?;
    tx.commit()?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn migrate_to(conn: &mut Connection, version: usize) -> Result<()> {
    Migrations::new(MIGRATIONS[..version].iter().copied().map(M::up).collect())
        .to_latest(conn)?;
    Ok(())
}
