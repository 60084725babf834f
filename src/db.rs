//! Database module for the orchestrator
//!
//! Provides persistence for sessions and their message transcripts.

mod schema;

pub use schema::*;

use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("session not found: {0}")]
    SessionNotFound(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Session operations ====================

    pub fn create_session(&self, id: &str, tenant_id: &str, user_id: &str, title: Option<&str>) -> DbResult<Session> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO sessions (id, tenant_id, user_id, title, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, tenant_id, user_id, title, now.to_rfc3339()],
        )?;

        Ok(Session {
            id: id.to_string(),
            tenant_id: tenant_id.to_string(),
            user_id: user_id.to_string(),
            title: title.map(String::from),
            created_at: now,
        })
    }

    pub fn get_session(&self, id: &str) -> DbResult<Session> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, user_id, title, created_at FROM sessions WHERE id = ?1",
        )?;

        stmt.query_row(params![id], |row| {
            Ok(Session {
                id: row.get(0)?,
                tenant_id: row.get(1)?,
                user_id: row.get(2)?,
                title: row.get(3)?,
                created_at: parse_datetime(&row.get::<_, String>(4)?),
            })
        })
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => DbError::SessionNotFound(id.to_string()),
            other => DbError::Sqlite(other),
        })
    }

    /// List sessions owned by a `(tenant_id, user_id)` pair, most recent first.
    pub fn list_sessions(&self, tenant_id: &str, user_id: &str) -> DbResult<Vec<Session>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, user_id, title, created_at FROM sessions
             WHERE tenant_id = ?1 AND user_id = ?2
             ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map(params![tenant_id, user_id], |row| {
            Ok(Session {
                id: row.get(0)?,
                tenant_id: row.get(1)?,
                user_id: row.get(2)?,
                title: row.get(3)?,
                created_at: parse_datetime(&row.get::<_, String>(4)?),
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// `true` if the session exists and belongs to `(tenant_id, user_id)`.
    pub fn session_belongs_to(&self, id: &str, tenant_id: &str, user_id: &str) -> DbResult<bool> {
        let session = self.get_session(id)?;
        Ok(session.tenant_id == tenant_id && session.user_id == user_id)
    }

    // ==================== Message operations ====================

    pub fn append_message(&self, id: &str, session_id: &str, sender: &str, content: &str) -> DbResult<Message> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO messages (id, session_id, sender, content, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, session_id, sender, content, now.to_rfc3339()],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation => {
                DbError::SessionNotFound(session_id.to_string())
            }
            other => DbError::Sqlite(other),
        })?;

        Ok(Message {
            id: id.to_string(),
            session_id: session_id.to_string(),
            sender: sender.to_string(),
            content: content.to_string(),
            created_at: now,
        })
    }

    /// List messages for a session in enqueue (chronological) order, optionally capped to the
    /// most recent `limit` messages.
    pub fn list_messages(&self, session_id: &str, limit: Option<usize>) -> DbResult<Vec<Message>> {
        let conn = self.conn.lock().unwrap();

        let mut messages = if let Some(limit) = limit {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, sender, content, created_at FROM messages
                 WHERE session_id = ?1 ORDER BY created_at DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![session_id, limit as i64], parse_message_row)?;
            rows.collect::<Result<Vec<_>, _>>()?
        } else {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, sender, content, created_at FROM messages
                 WHERE session_id = ?1 ORDER BY created_at DESC",
            )?;
            let rows = stmt.query_map(params![session_id], parse_message_row)?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        messages.reverse();
        Ok(messages)
    }
}

fn parse_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        session_id: row.get(1)?,
        sender: row.get(2)?,
        content: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

fn parse_datetime(s: &str) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_get_session() {
        let db = Database::open_in_memory().unwrap();

        let session = db.create_session("sess-1", "acme", "u-1", Some("Support thread")).unwrap();
        assert_eq!(session.id, "sess-1");
        assert_eq!(session.tenant_id, "acme");

        let fetched = db.get_session("sess-1").unwrap();
        assert_eq!(fetched.id, session.id);
        assert_eq!(fetched.title.as_deref(), Some("Support thread"));
    }

    #[test]
    fn test_get_session_not_found() {
        let db = Database::open_in_memory().unwrap();
        let err = db.get_session("missing").unwrap_err();
        assert!(matches!(err, DbError::SessionNotFound(id) if id == "missing"));
    }

    #[test]
    fn test_list_sessions_scoped_by_tenant_and_user() {
        let db = Database::open_in_memory().unwrap();
        db.create_session("sess-1", "acme", "u-1", None).unwrap();
        db.create_session("sess-2", "acme", "u-2", None).unwrap();
        db.create_session("sess-3", "other", "u-1", None).unwrap();

        let sessions = db.list_sessions("acme", "u-1").unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, "sess-1");
    }

    #[test]
    fn test_append_and_list_messages_enqueue_order() {
        let db = Database::open_in_memory().unwrap();
        db.create_session("sess-1", "acme", "u-1", None).unwrap();

        db.append_message("m-1", "sess-1", "user", "hello").unwrap();
        db.append_message("m-2", "sess-1", "aria", "hi there").unwrap();
        db.append_message("m-3", "sess-1", "user", "how are you").unwrap();

        let messages = db.list_messages("sess-1", None).unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].id, "m-1");
        assert_eq!(messages[2].id, "m-3");
    }

    #[test]
    fn test_list_messages_limit_keeps_most_recent_in_order() {
        let db = Database::open_in_memory().unwrap();
        db.create_session("sess-1", "acme", "u-1", None).unwrap();
        for i in 0..5 {
            db.append_message(&format!("m-{i}"), "sess-1", "user", "hi").unwrap();
        }

        let messages = db.list_messages("sess-1", Some(2)).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, "m-3");
        assert_eq!(messages[1].id, "m-4");
    }

    #[test]
    fn test_append_message_to_missing_session_fails() {
        let db = Database::open_in_memory().unwrap();
        let err = db.append_message("m-1", "missing", "user", "hi").unwrap_err();
        assert!(matches!(err, DbError::SessionNotFound(_)));
    }
}
