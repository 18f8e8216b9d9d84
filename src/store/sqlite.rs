//! SQLite-backed local store

use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{ChatTurn, StoredItem};
use crate::error::{Error, Result};
use crate::query::{SqlValidator, StatementKind, SynthesizedStatement};

/// The only table synthesized statements may touch
pub const CANONICAL_TABLE: &str = "mydata";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS mydata (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        content TEXT NOT NULL,
        label TEXT NOT NULL DEFAULT '',
        lang TEXT NOT NULL DEFAULT '',
        timestamp INTEGER NOT NULL,
        UNIQUE(content, label)
    );
    CREATE INDEX IF NOT EXISTS idx_mydata_label ON mydata(label);
    CREATE INDEX IF NOT EXISTS idx_mydata_timestamp ON mydata(timestamp);

    CREATE TABLE IF NOT EXISTS chat_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT NOT NULL,
        role TEXT NOT NULL,
        content TEXT NOT NULL,
        timestamp INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_chat_history_session
        ON chat_history(session_id, timestamp);
";

/// Result of executing a statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    /// SELECT results, newest first
    Rows(Vec<StoredItem>),
    /// Rows changed by INSERT or DELETE
    Affected(usize),
}

impl StoreOutcome {
    pub fn rows(self) -> Vec<StoredItem> {
        match self {
            StoreOutcome::Rows(rows) => rows,
            StoreOutcome::Affected(_) => Vec::new(),
        }
    }

    pub fn affected(&self) -> usize {
        match self {
            StoreOutcome::Rows(rows) => rows.len(),
            StoreOutcome::Affected(n) => *n,
        }
    }
}

/// Embedded store shared by all connections of the warm process
pub struct LocalStore {
    conn: Mutex<Connection>,
    validator: SqlValidator,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("table", &self.validator.table())
            .finish_non_exhaustive()
    }
}

impl LocalStore {
    /// Open (creating if needed) the database at `path`.
    ///
    /// `encryption_key` is applied as the SQLCipher key when built with the
    /// `encryption` feature.
    pub fn open(path: &Path, encryption_key: Option<&str>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        #[cfg(unix)]
        if path.exists() {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
        }

        Self::apply_key(&conn, encryption_key)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;

        tracing::debug!(path = %path.display(), "Opened local store");
        Self::with_connection(conn)
    }

    /// Private in-memory store, used by tests and `rules_only` dry runs
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            validator: SqlValidator::new(CANONICAL_TABLE),
        })
    }

    #[cfg(feature = "encryption")]
    fn apply_key(conn: &Connection, key: Option<&str>) -> Result<()> {
        if let Some(key) = key.filter(|k| !k.is_empty()) {
            conn.pragma_update(None, "key", key)?;
        }
        Ok(())
    }

    #[cfg(not(feature = "encryption"))]
    fn apply_key(_conn: &Connection, key: Option<&str>) -> Result<()> {
        if key.is_some() {
            tracing::warn!("Encryption key supplied but built without the `encryption` feature");
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Internal("Store lock poisoned".to_string()))
    }

    /// Execute a sealed statement against the canonical table.
    ///
    /// Statements are re-checked here; anything unsealed or invalid is
    /// refused before touching the database.
    pub fn execute(&self, stmt: &SynthesizedStatement) -> Result<StoreOutcome> {
        if !stmt.is_safe {
            return Err(Error::Internal(
                "Refusing to execute an unvalidated statement".to_string(),
            ));
        }
        let kind = self.validator.validate(&stmt.text, stmt.parameters.len())?;
        let params = rusqlite::params_from_iter(stmt.parameters.iter());

        let conn = self.lock()?;
        let outcome = match kind {
            StatementKind::Select => {
                let mut prepared = conn.prepare(&stmt.text)?;
                let rows = prepared
                    .query_map(params, row_to_item)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                StoreOutcome::Rows(rows)
            }
            StatementKind::Insert | StatementKind::Delete => {
                StoreOutcome::Affected(conn.execute(&stmt.text, params)?)
            }
        };

        tracing::debug!(kind = ?kind, affected = outcome.affected(), "Executed statement");
        Ok(outcome)
    }

    /// [`execute`](Self::execute) on the blocking pool
    pub async fn run(self: &Arc<Self>, stmt: SynthesizedStatement) -> Result<StoreOutcome> {
        let store = Arc::clone(self);
        tokio::task::spawn_blocking(move || store.execute(&stmt))
            .await
            .map_err(|e| Error::Internal(format!("Store task failed: {}", e)))?
    }

    /// Number of saved items
    pub fn item_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM mydata", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    /// Append one chat turn
    pub fn append_turn(&self, turn: &ChatTurn) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO chat_history (session_id, role, content, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params![turn.session_id, turn.role, turn.content, turn.timestamp],
        )?;
        Ok(())
    }

    /// Last `limit` turns of a session, oldest first
    pub fn history(&self, session_id: &str, limit: usize) -> Result<Vec<ChatTurn>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT session_id, role, content, timestamp FROM chat_history
             WHERE session_id = ?1 ORDER BY timestamp DESC, id DESC LIMIT ?2",
        )?;
        let mut turns = stmt
            .query_map(params![session_id, limit as i64], |row| {
                Ok(ChatTurn {
                    session_id: row.get(0)?,
                    role: row.get(1)?,
                    content: row.get(2)?,
                    timestamp: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        turns.reverse();
        Ok(turns)
    }

    /// Drop the chat history of every session, returning how many turns went
    pub fn clear_history(&self) -> Result<usize> {
        let conn = self.lock()?;
        Ok(conn.execute("DELETE FROM chat_history", [])?)
    }
}

fn row_to_item(row: &Row<'_>) -> rusqlite::Result<StoredItem> {
    let label: String = row.get(2)?;
    Ok(StoredItem {
        id: row.get(0)?,
        content: row.get(1)?,
        label: (!label.is_empty()).then_some(label),
        language: row.get(3)?,
        created_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{DeleteTarget, ListFilter, RetrieveQuery, SaveData, ValueKind};
    use crate::query::{QuerySynthesizer, SqlParam};

    fn setup() -> (LocalStore, QuerySynthesizer) {
        (
            LocalStore::open_in_memory().unwrap(),
            QuerySynthesizer::new(CANONICAL_TABLE),
        )
    }

    fn save(store: &LocalStore, synth: &QuerySynthesizer, label: Option<&str>, value: &str, ts: i64) {
        let data = SaveData::new(label, value, ValueKind::Text).unwrap();
        store.execute(&synth.save(&data, "en", ts).unwrap()).unwrap();
    }

    #[test]
    fn test_save_and_retrieve_newest_first() {
        let (store, synth) = setup();
        save(&store, &synth, Some("email"), "old@x.io", 1);
        save(&store, &synth, Some("email"), "new@x.io", 2);

        let q = RetrieveQuery::new(["email"]).unwrap();
        let rows = store.execute(&synth.retrieve(&q).unwrap()).unwrap().rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].content, "new@x.io");
        assert_eq!(rows[0].label.as_deref(), Some("email"));
    }

    #[test]
    fn test_duplicate_save_refreshes_timestamp() {
        let (store, synth) = setup();
        save(&store, &synth, Some("email"), "a@b.io", 1);
        save(&store, &synth, Some("email"), "a@b.io", 50);
        save(&store, &synth, None, "12345", 3);
        save(&store, &synth, None, "12345", 4);
        assert_eq!(store.item_count().unwrap(), 2);

        let rows = store
            .execute(&synth.list(&ListFilter::All).unwrap())
            .unwrap()
            .rows();
        assert_eq!(rows[0].content, "a@b.io");
        assert_eq!(rows[0].created_at, 50);
        assert!(rows[1].label.is_none());
    }

    #[test]
    fn test_like_wildcards_are_literal() {
        let (store, synth) = setup();
        save(&store, &synth, Some("discount"), "50%", 1);
        save(&store, &synth, Some("other"), "500", 2);

        let rows = store
            .execute(&synth.list(&ListFilter::keyword("0%")).unwrap())
            .unwrap()
            .rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].content, "50%");
    }

    #[test]
    fn test_delete_by_label_and_ids() {
        let (store, synth) = setup();
        save(&store, &synth, Some("email"), "a@b.io", 1);
        save(&store, &synth, Some("work email"), "c@d.io", 2);
        save(&store, &synth, Some("phone"), "555", 3);

        let target = DeleteTarget::label("email").unwrap();
        let preview = store
            .execute(&synth.preview_delete(&target).unwrap())
            .unwrap()
            .rows();
        assert_eq!(preview.len(), 2);

        let ids: Vec<i64> = preview.iter().map(|i| i.id).collect();
        let outcome = store.execute(&synth.delete_ids(&ids).unwrap()).unwrap();
        assert_eq!(outcome, StoreOutcome::Affected(2));
        assert_eq!(store.item_count().unwrap(), 1);
    }

    #[test]
    fn test_hostile_value_is_stored_verbatim() {
        let (store, synth) = setup();
        let hostile = "x'); DROP TABLE mydata; --";
        save(&store, &synth, Some("note"), hostile, 1);
        let rows = store
            .execute(&synth.list(&ListFilter::All).unwrap())
            .unwrap()
            .rows();
        assert_eq!(rows[0].content, hostile);
    }

    #[test]
    fn test_refuses_unsealed_statement() {
        let (store, _) = setup();
        let stmt = SynthesizedStatement {
            kind: StatementKind::Delete,
            text: "DELETE FROM mydata".to_string(),
            parameters: vec![],
            is_safe: false,
        };
        assert!(matches!(store.execute(&stmt), Err(Error::Internal(_))));

        let forged = SynthesizedStatement {
            kind: StatementKind::Select,
            text: "SELECT * FROM chat_history WHERE role = ?".to_string(),
            parameters: vec![SqlParam::from("user")],
            is_safe: true,
        };
        assert!(matches!(store.execute(&forged), Err(Error::Validation(_))));
    }

    #[test]
    fn test_chat_history_window_and_clear() {
        let (store, _) = setup();
        for i in 0..5 {
            store
                .append_turn(&ChatTurn {
                    session_id: "s1".to_string(),
                    role: if i % 2 == 0 { "user" } else { "assistant" }.to_string(),
                    content: format!("m{}", i),
                    timestamp: i,
                })
                .unwrap();
        }
        let turns = store.history("s1", 3).unwrap();
        let contents: Vec<_> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
        assert!(store.history("other", 10).unwrap().is_empty());

        assert_eq!(store.clear_history().unwrap(), 5);
        assert!(store.history("s1", 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_on_blocking_pool() {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        let synth = QuerySynthesizer::new(CANONICAL_TABLE);
        let data = SaveData::new(Some("pin"), "4242", ValueKind::Number).unwrap();
        let outcome = store.run(synth.save(&data, "en", 1).unwrap()).await.unwrap();
        assert_eq!(outcome.affected(), 1);
    }

    #[test]
    fn test_open_on_disk_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("memory.db");
        let synth = QuerySynthesizer::new(CANONICAL_TABLE);
        {
            let store = LocalStore::open(&path, None).unwrap();
            save(&store, &synth, Some("email"), "a@b.io", 1);
        }
        let store = LocalStore::open(&path, None).unwrap();
        assert_eq!(store.item_count().unwrap(), 1);
    }
}
