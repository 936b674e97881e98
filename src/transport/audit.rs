use rusqlite::{params, Connection};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub at: i64,
    pub target: String,
    pub command: String,
    pub result: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("sqlite open failed at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to create state directory {path}: {source}")]
    CreateParent {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("sqlite statement failed: {source}")]
    Sql {
        #[source]
        source: rusqlite::Error,
    },
}

/// Append-only record of every transport exec: target, command, raw result.
/// Written regardless of outcome so operators can reconstruct any exchange.
#[derive(Debug, Clone)]
pub struct AuditLog {
    db_path: PathBuf,
}

impl AuditLog {
    pub fn open(db_path: &Path) -> Result<Self, AuditError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).map_err(|source| AuditError::CreateParent {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let log = Self {
            db_path: db_path.to_path_buf(),
        };
        log.ensure_schema()?;
        Ok(log)
    }

    fn connect(&self) -> Result<Connection, AuditError> {
        Connection::open(&self.db_path).map_err(|source| AuditError::Open {
            path: self.db_path.display().to_string(),
            source,
        })
    }

    fn ensure_schema(&self) -> Result<(), AuditError> {
        let connection = self.connect()?;
        connection
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS transport_audit (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    at INTEGER NOT NULL,
                    target TEXT NOT NULL,
                    command TEXT NOT NULL,
                    result TEXT NOT NULL
                );
                ",
            )
            .map_err(|source| AuditError::Sql { source })
    }

    pub fn append(
        &self,
        at: i64,
        target: &str,
        command: &str,
        result: &str,
    ) -> Result<(), AuditError> {
        let connection = self.connect()?;
        connection
            .execute(
                "INSERT INTO transport_audit (at, target, command, result)
                 VALUES (?1, ?2, ?3, ?4)",
                params![at, target, command, result],
            )
            .map_err(|source| AuditError::Sql { source })?;
        Ok(())
    }

    pub fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, AuditError> {
        let connection = self.connect()?;
        let mut statement = connection
            .prepare(
                "SELECT at, target, command, result FROM transport_audit
                 ORDER BY id DESC LIMIT ?1",
            )
            .map_err(|source| AuditError::Sql { source })?;
        let rows = statement
            .query_map(params![limit as i64], |row| {
                Ok(AuditEntry {
                    at: row.get(0)?,
                    target: row.get(1)?,
                    command: row.get(2)?,
                    result: row.get(3)?,
                })
            })
            .map_err(|source| AuditError::Sql { source })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|source| AuditError::Sql { source })?);
        }
        Ok(out)
    }
}
