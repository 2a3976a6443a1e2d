//! Forward-only schema migrations keyed on `PRAGMA user_version`.

use rusqlite::Connection;

use crate::{schema, DbError, Result, SCHEMA_VERSION};

/// Apply every step between the stored `user_version` and
/// [`SCHEMA_VERSION`]. A fresh database gets the v1 schema and then the
/// same steps an upgraded one would.
pub fn run(conn: &Connection) -> Result<()> {
    let mut stored: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if stored > SCHEMA_VERSION {
        return Err(DbError::Migration(format!(
            "database schema v{stored} is newer than this build (v{SCHEMA_VERSION})"
        )));
    }
    if stored == 0 {
        tracing::info!("creating quiz schema");
        conn.execute_batch(schema::SCHEMA_V1)?;
        conn.pragma_update(None, "user_version", 1)?;
        stored = 1;
    }
    for next in (stored + 1)..=SCHEMA_VERSION {
        tracing::info!(version = next, "migrating quiz schema");
        step(conn, next)?;
        conn.pragma_update(None, "user_version", next)?;
    }
    Ok(())
}

fn step(conn: &Connection, version: u32) -> Result<()> {
    match version {
        2 => conn.execute_batch(schema::MIGRATION_V2)?,
        _ => {
            return Err(DbError::Migration(format!(
                "no migration defined for v{version}"
            )))
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute_batch("PRAGMA foreign_keys = ON;").expect("pragma");
        conn
    }

    #[test]
    fn test_fresh_migration() {
        let conn = fresh();
        run(&conn).expect("migrate");

        let version: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .expect("version");
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_idempotent_migration() {
        let conn = fresh();
        run(&conn).expect("first run");
        run(&conn).expect("second run is a no-op");
    }

    #[test]
    fn test_newer_database_rejected() {
        let conn = fresh();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .expect("bump");
        assert!(matches!(run(&conn), Err(DbError::Migration(_))));
    }

    #[test]
    fn test_v1_database_upgrades() {
        let conn = fresh();
        conn.execute_batch(schema::SCHEMA_V1).expect("v1 schema");
        conn.pragma_update(None, "user_version", 1).expect("v1");
        conn.execute(
            "INSERT INTO users (id, created_at) VALUES ('u1', 1)",
            [],
        )
        .expect("user");
        conn.execute(
            "INSERT INTO user_state (user_id, session_id, updated_at) VALUES ('u1', 's', 1)",
            [],
        )
        .expect("state");

        run(&conn).expect("migrate");

        let decayed_at: Option<i64> = conn
            .query_row(
                "SELECT streak_decayed_at FROM user_state WHERE user_id = 'u1'",
                [],
                |row| row.get(0),
            )
            .expect("new column");
        assert_eq!(decayed_at, None);
        let version: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .expect("version");
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_tables_created() {
        let conn = fresh();
        run(&conn).expect("migrate");

        let expected_tables = [
            "users",
            "user_state",
            "answer_log",
            "leaderboard_score",
            "leaderboard_streak",
        ];

        for table in &expected_tables {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .expect("table check");
            assert_eq!(count, 1, "Table '{table}' should exist");
        }
    }
}
