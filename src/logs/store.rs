use super::{LogEntry, LogError};
use getrandom::getrandom;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted log entries. A placeholder row is created at first retrieval so
/// dependent UIs can render immediately; completion rewrites the same row.
#[derive(Debug, Clone)]
pub struct LogStore {
    db_path: PathBuf,
}

impl LogStore {
    pub fn open(db_path: &Path) -> Result<Self, LogError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).map_err(|source| LogError::CreateParent {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let store = Self {
            db_path: db_path.to_path_buf(),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn connect(&self) -> Result<Connection, LogError> {
        Connection::open(&self.db_path).map_err(|source| LogError::Open {
            path: self.db_path.display().to_string(),
            source,
        })
    }

    fn ensure_schema(&self) -> Result<(), LogError> {
        let connection = self.connect()?;
        connection
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS log_entries (
                    reference TEXT PRIMARY KEY,
                    command_name TEXT NOT NULL,
                    content TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_log_entries_command
                    ON log_entries(command_name);
                ",
            )
            .map_err(|source| LogError::Sql { source })
    }

    pub fn create_placeholder(&self, command_name: &str, now: i64) -> Result<String, LogError> {
        let mut bytes = [0u8; 8];
        getrandom(&mut bytes).map_err(|err| LogError::Reference {
            reason: err.to_string(),
        })?;
        let reference = format!("log-{}", hex_encode(&bytes));
        let connection = self.connect()?;
        connection
            .execute(
                "INSERT INTO log_entries (reference, command_name, content, created_at, updated_at)
                 VALUES (?1, ?2, '', ?3, ?3)",
                params![reference, command_name, now],
            )
            .map_err(|source| LogError::Sql { source })?;
        Ok(reference)
    }

    /// Rewrites the entry under its existing reference; no duplicate row.
    pub fn rewrite(&self, reference: &str, content: &str, now: i64) -> Result<(), LogError> {
        let connection = self.connect()?;
        connection
            .execute(
                "UPDATE log_entries SET content = ?2, updated_at = ?3 WHERE reference = ?1",
                params![reference, content, now],
            )
            .map_err(|source| LogError::Sql { source })?;
        Ok(())
    }

    pub fn load(&self, reference: &str) -> Result<Option<LogEntry>, LogError> {
        let connection = self.connect()?;
        connection
            .query_row(
                "SELECT reference, command_name, content, created_at, updated_at
                 FROM log_entries WHERE reference = ?1",
                params![reference],
                |row| {
                    Ok(LogEntry {
                        reference: row.get(0)?,
                        command_name: row.get(1)?,
                        content: row.get(2)?,
                        created_at: row.get(3)?,
                        updated_at: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(|source| LogError::Sql { source })
    }

    pub fn count_for_command(&self, command_name: &str) -> Result<usize, LogError> {
        let connection = self.connect()?;
        connection
            .query_row(
                "SELECT COUNT(*) FROM log_entries WHERE command_name = ?1",
                params![command_name],
                |row| row.get::<_, i64>(0),
            )
            .map(|count| count as usize)
            .map_err(|source| LogError::Sql { source })
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}
