use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

/// A partial view of the key/value store: missing keys are simply absent.
pub type StoreRecord = Map<String, Value>;

pub fn initialize_database(path: &Path) -> Result<(), InfraError> {
    let connection = Connection::open(path)?;
    connection.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn get(&self, keys: &[&str]) -> Result<StoreRecord, InfraError>;
    async fn set(&self, record: StoreRecord) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }
}

#[async_trait]
impl DurableStore for SqliteStore {
    async fn get(&self, keys: &[&str]) -> Result<StoreRecord, InfraError> {
        let db_path = self.db_path.clone();
        let keys = keys.iter().map(|key| (*key).to_string()).collect::<Vec<_>>();
        tokio::task::spawn_blocking(move || read_keys(&db_path, &keys))
            .await
            .map_err(|error| InfraError::Storage(format!("store read task failed: {error}")))?
    }

    async fn set(&self, record: StoreRecord) -> Result<(), InfraError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || write_record(&db_path, record))
            .await
            .map_err(|error| InfraError::Storage(format!("store write task failed: {error}")))?
    }
}

fn read_keys(db_path: &Path, keys: &[String]) -> Result<StoreRecord, InfraError> {
    let connection = Connection::open(db_path)?;
    let mut statement = connection.prepare("SELECT value FROM kv WHERE key = ?1")?;
    let mut record = StoreRecord::new();
    for key in keys {
        let raw: Option<String> = statement
            .query_row(params![key], |row| row.get(0))
            .optional()?;
        if let Some(raw) = raw {
            record.insert(key.clone(), serde_json::from_str(&raw)?);
        }
    }
    Ok(record)
}

fn write_record(db_path: &Path, record: StoreRecord) -> Result<(), InfraError> {
    let mut connection = Connection::open(db_path)?;
    let transaction = connection.transaction()?;
    let updated_at = Utc::now().to_rfc3339();
    for (key, value) in record {
        transaction.execute(
            "INSERT INTO kv (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
               value = excluded.value,
               updated_at = excluded.updated_at",
            params![key, value.to_string(), updated_at],
        )?;
    }
    transaction.commit()?;
    Ok(())
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl InMemoryStore {
    pub fn with_record(record: StoreRecord) -> Self {
        Self {
            entries: Mutex::new(record.into_iter().collect()),
        }
    }

    fn lock_entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Value>>, InfraError> {
        self.entries
            .lock()
            .map_err(|_| InfraError::InvalidConfig("in-memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl DurableStore for InMemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<StoreRecord, InfraError> {
        let entries = self.lock_entries()?;
        Ok(keys
            .iter()
            .filter_map(|key| {
                entries
                    .get(*key)
                    .map(|value| ((*key).to_string(), value.clone()))
            })
            .collect())
    }

    async fn set(&self, record: StoreRecord) -> Result<(), InfraError> {
        let mut entries = self.lock_entries()?;
        entries.extend(record);
        Ok(())
    }
}
