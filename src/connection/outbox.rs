//! SQLite spool for actions that could not be delivered.
//!
//! Actions produced while the collector is offline are stored here and
//! replayed oldest-first once a reconnect succeeds. The spool is bounded;
//! when full the oldest rows are dropped.

use super::types::UserAction;
use crate::error::OutboxError;
use chrono::Utc;
use rusqlite::{params, Connection as SqlConnection};
use std::path::{Path, PathBuf};

/// Persistent FIFO of undelivered actions.
pub struct Outbox {
    conn: SqlConnection,
    max_records: usize,
}

impl Outbox {
    /// Opens or creates the outbox database at `path`.
    pub fn open(path: &Path, max_records: usize) -> Result<Self, OutboxError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        tracing::info!(path = ?path, "Opening outbox");

        let conn = SqlConnection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let outbox = Self { conn, max_records };
        outbox.init_schema()?;
        Ok(outbox)
    }

    /// Opens an in-memory outbox (for testing).
    pub fn open_in_memory(max_records: usize) -> Result<Self, OutboxError> {
        let outbox = Self {
            conn: SqlConnection::open_in_memory()?,
            max_records,
        };
        outbox.init_schema()?;
        Ok(outbox)
    }

    /// Returns the default outbox path.
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("useraction")
            .join("outbox.db")
    }

    fn init_schema(&self) -> Result<(), OutboxError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS outbox (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Appends an action. Returns how many old rows were dropped to stay
    /// within the bound.
    pub fn push(&self, action: &UserAction) -> Result<usize, OutboxError> {
        let payload = serde_json::to_string(action)?;
        self.conn.execute(
            "INSERT INTO outbox (kind, payload, created_at) VALUES (?1, ?2, ?3)",
            params![action.kind.to_string(), payload, Utc::now().to_rfc3339()],
        )?;

        let len = self.len()?;
        if len <= self.max_records {
            return Ok(0);
        }

        let dropped = self.conn.execute(
            "DELETE FROM outbox WHERE id IN (SELECT id FROM outbox ORDER BY id ASC LIMIT ?1)",
            params![(len - self.max_records) as i64],
        )?;
        tracing::warn!(
            dropped,
            max_records = self.max_records,
            "Outbox full, dropped oldest actions"
        );
        Ok(dropped)
    }

    /// Returns up to `limit` oldest readable actions with their row ids.
    ///
    /// Rows that no longer decode are deleted on the way, and reading carries
    /// on past them, so a run of bad rows never hides good rows behind it.
    pub fn peek(&self, limit: usize) -> Result<Vec<(i64, UserAction)>, OutboxError> {
        let mut out = Vec::new();
        let mut after = 0i64;

        while out.len() < limit {
            let rows = self.fetch_after(after, limit - out.len())?;
            if rows.is_empty() {
                break;
            }
            for (id, payload) in rows {
                after = id;
                match serde_json::from_str::<UserAction>(&payload) {
                    Ok(action) => out.push((id, action)),
                    Err(e) => {
                        tracing::warn!(id, error = %e, "Discarding unreadable outbox row");
                        self.remove(id)?;
                    }
                }
            }
        }
        Ok(out)
    }

    fn fetch_after(&self, after: i64, limit: usize) -> Result<Vec<(i64, String)>, OutboxError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, payload FROM outbox WHERE id > ?1 ORDER BY id ASC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![after, limit as i64], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Removes a delivered action.
    pub fn remove(&self, id: i64) -> Result<(), OutboxError> {
        self.conn
            .execute("DELETE FROM outbox WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn len(&self) -> Result<usize, OutboxError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM outbox", [], |r| r.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool, OutboxError> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::types::{ActionKind, Identity};

    fn action(message: &str) -> UserAction {
        UserAction::new(&Identity::default(), ActionKind::Print, message)
    }

    #[test]
    fn test_push_and_peek_fifo() {
        let outbox = Outbox::open_in_memory(100).unwrap();
        outbox.push(&action("one")).unwrap();
        outbox.push(&action("two")).unwrap();

        let rows = outbox.peek(10).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].1.message, "one");
        assert_eq!(rows[1].1.message, "two");

        outbox.remove(rows[0].0).unwrap();
        assert_eq!(outbox.len().unwrap(), 1);
        assert_eq!(outbox.peek(10).unwrap()[0].1.message, "two");
    }

    #[test]
    fn test_bound_drops_oldest() {
        let outbox = Outbox::open_in_memory(2).unwrap();
        assert_eq!(outbox.push(&action("a")).unwrap(), 0);
        assert_eq!(outbox.push(&action("b")).unwrap(), 0);
        assert_eq!(outbox.push(&action("c")).unwrap(), 1);

        let messages: Vec<_> = outbox
            .peek(10)
            .unwrap()
            .into_iter()
            .map(|(_, a)| a.message)
            .collect();
        assert_eq!(messages, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_unreadable_row_is_discarded() {
        let outbox = Outbox::open_in_memory(10).unwrap();
        outbox
            .conn
            .execute(
                "INSERT INTO outbox (kind, payload, created_at) VALUES ('print', 'not json', 'x')",
                [],
            )
            .unwrap();
        outbox.push(&action("good")).unwrap();

        let rows = outbox.peek(10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1.message, "good");
        assert_eq!(outbox.len().unwrap(), 1);
    }

    #[test]
    fn test_bad_batch_does_not_hide_good_rows() {
        let outbox = Outbox::open_in_memory(10).unwrap();
        for _ in 0..3 {
            outbox
                .conn
                .execute(
                    "INSERT INTO outbox (kind, payload, created_at) VALUES ('print', '{', 'x')",
                    [],
                )
                .unwrap();
        }
        outbox.push(&action("behind the bad rows")).unwrap();

        // The first two rows fetched are both unreadable.
        let rows = outbox.peek(2).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1.message, "behind the bad rows");
        assert_eq!(outbox.len().unwrap(), 1);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("outbox.db");
        {
            let outbox = Outbox::open(&path, 10).unwrap();
            outbox.push(&action("kept")).unwrap();
        }
        let outbox = Outbox::open(&path, 10).unwrap();
        assert!(!outbox.is_empty().unwrap());
        assert_eq!(outbox.peek(1).unwrap()[0].1.message, "kept");
    }
}
