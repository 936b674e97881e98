use super::{ResourceError, ResourceStore, ATTR_WORKFLOW_FAMILY};
use crate::shared::ResourceId;
use rusqlite::{params, Connection};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Attribute dictionary backed by the engine's sqlite database. Deployments
/// that keep resource records elsewhere implement `ResourceStore` against
/// that system instead.
#[derive(Debug, Clone)]
pub struct SqliteResourceStore {
    db_path: PathBuf,
}

impl SqliteResourceStore {
    pub fn open(db_path: &Path) -> Result<Self, ResourceError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).map_err(|source| ResourceError::CreateParent {
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

    fn connect(&self) -> Result<Connection, ResourceError> {
        Connection::open(&self.db_path).map_err(|source| ResourceError::Open {
            path: self.db_path.display().to_string(),
            source,
        })
    }

    fn ensure_schema(&self) -> Result<(), ResourceError> {
        let connection = self.connect()?;
        connection
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS resource_attributes (
                    resource_id INTEGER NOT NULL,
                    key TEXT NOT NULL,
                    value TEXT NOT NULL,
                    PRIMARY KEY (resource_id, key)
                );

                CREATE INDEX IF NOT EXISTS idx_resource_attributes_key
                    ON resource_attributes(key, value);
                ",
            )
            .map_err(|source| ResourceError::Sql { source })
    }
}

impl ResourceStore for SqliteResourceStore {
    fn attributes(&self, resource: ResourceId) -> Result<Map<String, Value>, ResourceError> {
        let connection = self.connect()?;
        let mut statement = connection
            .prepare("SELECT key, value FROM resource_attributes WHERE resource_id = ?1")
            .map_err(|source| ResourceError::Sql { source })?;
        let rows = statement
            .query_map(params![resource.value()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|source| ResourceError::Sql { source })?;

        let mut attrs = Map::new();
        for row in rows {
            let (key, raw) = row.map_err(|source| ResourceError::Sql { source })?;
            let value =
                serde_json::from_str(&raw).map_err(|source| ResourceError::Attribute {
                    resource,
                    key: key.clone(),
                    source,
                })?;
            attrs.insert(key, value);
        }
        Ok(attrs)
    }

    fn set_attribute(
        &self,
        resource: ResourceId,
        key: &str,
        value: Value,
    ) -> Result<(), ResourceError> {
        let raw = serde_json::to_string(&value).map_err(|source| ResourceError::Attribute {
            resource,
            key: key.to_string(),
            source,
        })?;
        let connection = self.connect()?;
        connection
            .execute(
                "INSERT OR REPLACE INTO resource_attributes (resource_id, key, value)
                 VALUES (?1, ?2, ?3)",
                params![resource.value(), key, raw],
            )
            .map_err(|source| ResourceError::Sql { source })?;
        Ok(())
    }

    fn remove_attribute(&self, resource: ResourceId, key: &str) -> Result<(), ResourceError> {
        let connection = self.connect()?;
        connection
            .execute(
                "DELETE FROM resource_attributes WHERE resource_id = ?1 AND key = ?2",
                params![resource.value(), key],
            )
            .map_err(|source| ResourceError::Sql { source })?;
        Ok(())
    }

    fn flagged(&self, family: &str) -> Result<Vec<ResourceId>, ResourceError> {
        let connection = self.connect()?;
        let mut statement = connection
            .prepare(
                "SELECT resource_id FROM resource_attributes
                 WHERE key = ?1 AND value = ?2 ORDER BY resource_id",
            )
            .map_err(|source| ResourceError::Sql { source })?;
        let raw = serde_json::to_string(&Value::String(family.to_string())).map_err(|source| {
            ResourceError::Attribute {
                resource: ResourceId::new(0),
                key: ATTR_WORKFLOW_FAMILY.to_string(),
                source,
            }
        })?;
        let rows = statement
            .query_map(params![ATTR_WORKFLOW_FAMILY, raw], |row| {
                row.get::<_, i64>(0)
            })
            .map_err(|source| ResourceError::Sql { source })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(ResourceId::new(
                row.map_err(|source| ResourceError::Sql { source })?,
            ));
        }
        Ok(out)
    }
}
