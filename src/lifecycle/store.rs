use super::{
    CommandRecord, InFlightRecord, LifecycleError, StartOutcome, UpdateOutcome, STATUS_COMPLETED,
    STATUS_STARTED,
};
use crate::shared::ResourceId;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

const KIND_IN_FLIGHT: &str = "inflight";
const KIND_DONE: &str = "done";

/// Sqlite-backed command lifecycle store. The single active record per
/// resource doubles as the mutex: the holder is that record's command name.
#[derive(Debug, Clone)]
pub struct LifecycleStore {
    db_path: PathBuf,
    long_running_timeout_seconds: i64,
}

struct StoredRecord {
    command_name: String,
    kind: String,
    status: String,
    payload: String,
    created_at: i64,
    expires_at: i64,
}

impl LifecycleStore {
    pub fn open(
        db_path: &Path,
        long_running_timeout_seconds: i64,
    ) -> Result<Self, LifecycleError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).map_err(|source| LifecycleError::CreateParent {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let store = Self {
            db_path: db_path.to_path_buf(),
            long_running_timeout_seconds,
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn connect(&self) -> Result<Connection, LifecycleError> {
        Connection::open(&self.db_path).map_err(|source| LifecycleError::Open {
            path: self.db_path.display().to_string(),
            source,
        })
    }

    fn ensure_schema(&self) -> Result<(), LifecycleError> {
        let connection = self.connect()?;
        connection
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS command_records (
                    resource_id INTEGER NOT NULL,
                    command_name TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    status TEXT NOT NULL,
                    payload TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    expires_at INTEGER NOT NULL,
                    PRIMARY KEY (resource_id, command_name)
                );

                CREATE INDEX IF NOT EXISTS idx_command_records_resource
                    ON command_records(resource_id, kind, expires_at);
                ",
            )
            .map_err(|source| LifecycleError::Sql { source })
    }

    fn load_row(
        &self,
        connection: &Connection,
        resource: ResourceId,
        name: &str,
    ) -> Result<Option<StoredRecord>, LifecycleError> {
        connection
            .query_row(
                "SELECT command_name, kind, status, payload, created_at, expires_at
                 FROM command_records WHERE resource_id = ?1 AND command_name = ?2",
                params![resource.value(), name],
                |row| {
                    Ok(StoredRecord {
                        command_name: row.get(0)?,
                        kind: row.get(1)?,
                        status: row.get(2)?,
                        payload: row.get(3)?,
                        created_at: row.get(4)?,
                        expires_at: row.get(5)?,
                    })
                },
            )
            .optional()
            .map_err(|source| LifecycleError::Sql { source })
    }

    /// The command currently holding the resource, if any. Lapsed records do
    /// not count.
    pub fn holder(&self, resource: ResourceId, now: i64) -> Result<Option<String>, LifecycleError> {
        let connection = self.connect()?;
        connection
            .query_row(
                "SELECT command_name FROM command_records
                 WHERE resource_id = ?1 AND kind = ?2 AND expires_at > ?3",
                params![resource.value(), KIND_IN_FLIGHT, now],
                |row| row.get(0),
            )
            .optional()
            .map_err(|source| LifecycleError::Sql { source })
    }

    /// Creates an in-flight record and acquires the mutex, unless any command
    /// is already active for the resource; then it idempotently reports the
    /// existing holder. The check and the insert are two statements, so
    /// overlapping callers can race; a second orchestrating process is not
    /// supported against the same database.
    pub fn start(
        &self,
        resource: ResourceId,
        name: &str,
        now: i64,
    ) -> Result<StartOutcome, LifecycleError> {
        if let Some(holder) = self.holder(resource, now)? {
            return Ok(StartOutcome::AlreadyHeld { holder });
        }
        let connection = self.connect()?;
        connection
            .execute(
                "INSERT OR REPLACE INTO command_records
                 (resource_id, command_name, kind, status, payload, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, '{}', ?5, ?6)",
                params![
                    resource.value(),
                    name,
                    KIND_IN_FLIGHT,
                    STATUS_STARTED,
                    now,
                    now + self.long_running_timeout_seconds
                ],
            )
            .map_err(|source| LifecycleError::Sql { source })?;
        Ok(StartOutcome::Acquired {
            name: name.to_string(),
        })
    }

    /// Applies a status transition. `completed` replaces the record with the
    /// terminal marker and releases the mutex; any other status merges into
    /// the payload and re-extends the expiry. Updates against an absent
    /// record create one, since an agent callback can outrun the dispatching
    /// side's `start` write — but only while no other command holds the
    /// mutex, so a stray callback cannot put two commands in flight at once.
    pub fn update(
        &self,
        resource: ResourceId,
        name: &str,
        status: &str,
        extra: &Map<String, Value>,
        now: i64,
    ) -> Result<UpdateOutcome, LifecycleError> {
        let connection = self.connect()?;
        let existing = self.load_row(&connection, resource, name)?;

        if let Some(row) = &existing {
            if row.kind == KIND_DONE {
                // Terminal marker wins over late out-of-order callbacks.
                return Ok(if status == STATUS_COMPLETED {
                    UpdateOutcome::Completed
                } else {
                    UpdateOutcome::Ignored
                });
            }
        }

        if status == STATUS_COMPLETED {
            connection
                .execute(
                    "INSERT OR REPLACE INTO command_records
                     (resource_id, command_name, kind, status, payload, created_at, expires_at)
                     VALUES (?1, ?2, ?3, ?4, '{}', ?5, 0)",
                    params![resource.value(), name, KIND_DONE, STATUS_COMPLETED, now],
                )
                .map_err(|source| LifecycleError::Sql { source })?;
            return Ok(UpdateOutcome::Completed);
        }

        let active = matches!(&existing, Some(row) if row.expires_at > now);
        if !active {
            if let Some(holder) = self.holder(resource, now)? {
                if holder != name {
                    return Ok(UpdateOutcome::Ignored);
                }
            }
        }

        let mut payload = match &existing {
            Some(row) if row.expires_at > now => parse_payload(resource, name, &row.payload)?,
            _ => Map::new(),
        };
        for (key, value) in extra {
            payload.insert(key.clone(), value.clone());
        }
        let created_at = existing
            .as_ref()
            .filter(|row| row.expires_at > now)
            .map(|row| row.created_at)
            .unwrap_or(now);
        let body = serde_json::to_string(&payload).map_err(|source| LifecycleError::Payload {
            resource,
            command: name.to_string(),
            source,
        })?;
        connection
            .execute(
                "INSERT OR REPLACE INTO command_records
                 (resource_id, command_name, kind, status, payload, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    resource.value(),
                    name,
                    KIND_IN_FLIGHT,
                    status,
                    body,
                    created_at,
                    now + self.long_running_timeout_seconds
                ],
            )
            .map_err(|source| LifecycleError::Sql { source })?;
        Ok(UpdateOutcome::Merged)
    }

    pub fn record(
        &self,
        resource: ResourceId,
        name: &str,
        now: i64,
    ) -> Result<Option<CommandRecord>, LifecycleError> {
        let connection = self.connect()?;
        let Some(row) = self.load_row(&connection, resource, name)? else {
            return Ok(None);
        };
        if row.kind == KIND_DONE {
            return Ok(Some(CommandRecord::Done));
        }
        if row.expires_at <= now {
            // Lapsed; readers treat it as no such command.
            return Ok(None);
        }
        let payload = parse_payload(resource, &row.command_name, &row.payload)?;
        Ok(Some(CommandRecord::InFlight(InFlightRecord {
            status: row.status,
            payload,
            created_at: row.created_at,
            expires_at: row.expires_at,
        })))
    }

    pub fn is_done(&self, resource: ResourceId, name: &str) -> Result<bool, LifecycleError> {
        let connection = self.connect()?;
        let row = self.load_row(&connection, resource, name)?;
        Ok(matches!(row, Some(stored) if stored.kind == KIND_DONE))
    }

    pub fn is_running(
        &self,
        resource: ResourceId,
        name: &str,
        now: i64,
    ) -> Result<bool, LifecycleError> {
        Ok(matches!(
            self.record(resource, name, now)?,
            Some(CommandRecord::InFlight(_))
        ))
    }

    /// Forcibly clears the mutex by dropping all in-flight records for the
    /// resource. Terminal markers stay for idempotent completion queries.
    pub fn release(&self, resource: ResourceId) -> Result<(), LifecycleError> {
        let connection = self.connect()?;
        connection
            .execute(
                "DELETE FROM command_records WHERE resource_id = ?1 AND kind = ?2",
                params![resource.value(), KIND_IN_FLIGHT],
            )
            .map_err(|source| LifecycleError::Sql { source })?;
        Ok(())
    }

    /// Removes a terminal marker once the caller has consumed the completion.
    pub fn clear(&self, resource: ResourceId, name: &str) -> Result<(), LifecycleError> {
        let connection = self.connect()?;
        connection
            .execute(
                "DELETE FROM command_records WHERE resource_id = ?1 AND command_name = ?2",
                params![resource.value(), name],
            )
            .map_err(|source| LifecycleError::Sql { source })?;
        Ok(())
    }
}

fn parse_payload(
    resource: ResourceId,
    command: &str,
    raw: &str,
) -> Result<Map<String, Value>, LifecycleError> {
    serde_json::from_str(raw).map_err(|source| LifecycleError::Payload {
        resource,
        command: command.to_string(),
        source,
    })
}
