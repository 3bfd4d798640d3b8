use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use crate::persistence::repository::{BuildRepository, SavedBuilds, StoreError};

const STORE_SCHEMA_VERSION: i64 = 1;

/// Key of the single record holding every saved build.
pub const SAVED_BUILDS_KEY: &str = "saved_builds";

const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS store_meta (
  id INTEGER PRIMARY KEY CHECK (id = 1),
  schema_version INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS records (
  record_key TEXT PRIMARY KEY,
  payload TEXT NOT NULL
);
"#;

pub struct SqliteBuildStore {
    conn: Connection,
}

impl SqliteBuildStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        let store = Self { conn };
        store.conn.execute_batch(STORE_SCHEMA)?;
        store.ensure_store_meta()?;
        Ok(store)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn ensure_store_meta(&self) -> Result<(), StoreError> {
        let schema_version = self
            .conn
            .query_row(
                "SELECT schema_version FROM store_meta WHERE id = 1",
                [],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;

        match schema_version {
            Some(STORE_SCHEMA_VERSION) => Ok(()),
            Some(other) => Err(StoreError::InvalidData(format!(
                "store_meta version mismatch (schema {}, expected {})",
                other, STORE_SCHEMA_VERSION
            ))),
            None => {
                self.conn.execute(
                    "INSERT INTO store_meta (id, schema_version) VALUES (1, ?1)",
                    params![STORE_SCHEMA_VERSION],
                )?;
                Ok(())
            }
        }
    }

    pub fn read_record(&self, key: &str) -> Result<Option<String>, StoreError> {
        let payload = self
            .conn
            .query_row(
                "SELECT payload FROM records WHERE record_key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(payload)
    }

    pub fn write_record(&self, key: &str, payload: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO records (record_key, payload) VALUES (?1, ?2)
             ON CONFLICT(record_key) DO UPDATE SET payload = excluded.payload",
            params![key, payload],
        )?;
        Ok(())
    }
}

impl BuildRepository for SqliteBuildStore {
    fn load_document(&self) -> Result<SavedBuilds, StoreError> {
        let Some(raw) = self.read_record(SAVED_BUILDS_KEY)? else {
            return Ok(SavedBuilds::default());
        };
        match serde_json::from_str(&raw) {
            Ok(builds) => Ok(builds),
            Err(err) => {
                warn!(%err, "saved builds record is malformed; reading as empty");
                Ok(SavedBuilds::default())
            }
        }
    }

    fn store_document(&mut self, builds: &SavedBuilds) -> Result<(), StoreError> {
        let payload = serde_json::to_string(builds)?;
        self.write_record(SAVED_BUILDS_KEY, &payload)
    }
}
