//! SQLite-backed version storage.
//!
//! One database holds a table per tracked field. Values are stored as JSON,
//! timestamps as microseconds since the Unix epoch.

use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::DateTime;
use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use super::VersionCollection;
use crate::error::{ErrorCode, VersoError, VersoResult};
use crate::versioning::Version;

type SharedConnection = Arc<Mutex<Connection>>;

fn lock(conn: &SharedConnection) -> VersoResult<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| VersoError::internal("version store connection lock poisoned"))
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// SQLite database holding version tables.
pub struct SqliteVersionStore {
    conn: SharedConnection,
    table_prefix: String,
}

impl SqliteVersionStore {
    /// Open (or create) a store at the given path.
    pub fn new(path: impl AsRef<Path>) -> VersoResult<Self> {
        let path = path.as_ref();
        let conn = if path.to_str() == Some(":memory:") {
            Connection::open_in_memory()?
        } else {
            // Ensure parent directory exists
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Connection::open(path).map_err(|e| VersoError::Database {
                message: format!("failed to open {}: {}", path.display(), e),
                code: ErrorCode::DbConnectionFailed,
                source: Some(Box::new(e)),
            })?
        };
        Ok(Self::from_connection(conn))
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> VersoResult<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            table_prefix: "versions".to_string(),
        }
    }

    /// Set the prefix applied to every version table.
    pub fn with_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    /// Open the collection for the field called `name`, creating its table.
    ///
    /// The table is named `{prefix}_{name}`; both parts must be
    /// alphanumeric or underscore.
    pub fn collection<T>(&self, name: &str) -> VersoResult<SqliteVersionCollection<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        if !is_identifier(&self.table_prefix) || !is_identifier(name) {
            return Err(VersoError::configuration(format!(
                "Invalid version table name '{}_{}'",
                self.table_prefix, name
            )));
        }
        let table = format!("{}_{}", self.table_prefix, name);

        lock(&self.conn)?.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id TEXT NOT NULL,
                recorded_at INTEGER NOT NULL,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_{table}_owner_time
                ON {table}(owner_id, recorded_at DESC);
            "#
        ))?;
        debug!(table = %table, "Opened version collection");

        Ok(SqliteVersionCollection {
            conn: Arc::clone(&self.conn),
            table,
            _marker: PhantomData,
        })
    }
}

/// Versions of one tracked type, stored in a single table.
pub struct SqliteVersionCollection<T> {
    conn: SharedConnection,
    table: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SqliteVersionCollection<T> {
    /// Backing table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Count stored versions across all owners.
    pub fn count_all(&self) -> VersoResult<usize> {
        let conn = lock(&self.conn)?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.table),
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

impl<T: DeserializeOwned> SqliteVersionCollection<T> {
    fn row_to_version(owner_id: &str, recorded_at: i64, value: &str) -> VersoResult<Version<T>> {
        let owner_id = Uuid::parse_str(owner_id).map_err(|e| VersoError::parse(e.to_string()))?;
        let recorded_at =
            DateTime::from_timestamp_micros(recorded_at).ok_or_else(|| VersoError::Parse {
                message: format!("timestamp out of range: {}", recorded_at),
                code: ErrorCode::ParseInvalidTimestamp,
            })?;
        Ok(Version::new(owner_id, recorded_at, serde_json::from_str(value)?))
    }
}

impl<T> VersionCollection<T> for SqliteVersionCollection<T>
where
    T: Serialize + DeserializeOwned,
{
    fn insert_many(&self, versions: &[Version<T>]) -> VersoResult<()> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} (owner_id, recorded_at, value) VALUES (?1, ?2, ?3)",
                self.table
            ))?;
            for version in versions {
                stmt.execute(params![
                    version.owner_id().to_string(),
                    version.recorded_at().timestamp_micros(),
                    serde_json::to_string(version.value())?,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn delete_owner(&self, owner_id: Uuid) -> VersoResult<usize> {
        let conn = lock(&self.conn)?;
        let count = conn.execute(
            &format!("DELETE FROM {} WHERE owner_id = ?1", self.table),
            params![owner_id.to_string()],
        )?;
        Ok(count)
    }

    fn query_owner(&self, owner_id: Uuid) -> VersoResult<Vec<Version<T>>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn.prepare(&format!(
            r#"SELECT owner_id, recorded_at, value
               FROM {}
               WHERE owner_id = ?1
               ORDER BY recorded_at DESC, seq DESC"#,
            self.table
        ))?;

        let rows = stmt.query_map(params![owner_id.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let versions: VersoResult<Vec<Version<T>>> = rows
            .map(|row| {
                let (owner, recorded_at, value) = row?;
                Self::row_to_version(&owner, recorded_at, &value)
            })
            .collect();
        versions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Address {
        street: String,
        city: String,
    }

    #[test]
    fn test_insert_and_query() {
        let store = SqliteVersionStore::in_memory().unwrap();
        let titles = store.collection::<String>("book_title").unwrap();
        let owner = Uuid::new_v4();
        let now = Utc::now();

        titles
            .insert_many(&[
                Version::new(owner, now - Duration::hours(2), "First".to_string()),
                Version::new(owner, now - Duration::hours(1), "Second".to_string()),
            ])
            .unwrap();

        let found = titles.query_owner(owner).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].value(), "Second");
        assert_eq!(found[1].value(), "First");
        assert_eq!(found[0].owner_id(), owner);
        assert_eq!(
            found[1].recorded_at().timestamp_micros(),
            (now - Duration::hours(2)).timestamp_micros()
        );
    }

    #[test]
    fn test_equal_timestamps_newest_insert_first() {
        let store = SqliteVersionStore::in_memory().unwrap();
        let ratings = store.collection::<u8>("rating").unwrap();
        let owner = Uuid::new_v4();
        let at = Utc::now();

        ratings
            .insert_many(&[Version::new(owner, at, 1), Version::new(owner, at, 2)])
            .unwrap();

        let values: Vec<u8> = ratings
            .query_owner(owner)
            .unwrap()
            .into_iter()
            .map(Version::into_value)
            .collect();
        assert_eq!(values, vec![2, 1]);
    }

    #[test]
    fn test_structured_values_round_trip() {
        let store = SqliteVersionStore::in_memory().unwrap();
        let addresses = store.collection::<Address>("address").unwrap();
        let owner = Uuid::new_v4();
        let old = Address {
            street: "1 Main St".to_string(),
            city: "Springfield".to_string(),
        };

        addresses
            .insert_many(&[Version::new(owner, Utc::now(), old.clone())])
            .unwrap();

        let found = addresses.query_owner(owner).unwrap();
        assert_eq!(found[0].value(), &old);
    }

    #[test]
    fn test_delete_owner_only_touches_owner() {
        let store = SqliteVersionStore::in_memory().unwrap();
        let titles = store.collection::<String>("book_title").unwrap();
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();
        let now = Utc::now();

        titles
            .insert_many(&[
                Version::new(owner, now, "a".to_string()),
                Version::new(owner, now, "b".to_string()),
                Version::new(other, now, "c".to_string()),
            ])
            .unwrap();

        assert_eq!(titles.delete_owner(owner).unwrap(), 2);
        assert!(titles.query_owner(owner).unwrap().is_empty());
        assert_eq!(titles.count_all().unwrap(), 1);
    }

    #[test]
    fn test_collections_share_database_but_not_tables() {
        let store = SqliteVersionStore::in_memory().unwrap();
        let titles = store.collection::<String>("book_title").unwrap();
        let ratings = store.collection::<u8>("book_rating").unwrap();
        let owner = Uuid::new_v4();

        titles
            .insert_many(&[Version::new(owner, Utc::now(), "t".to_string())])
            .unwrap();

        assert_eq!(titles.count_all().unwrap(), 1);
        assert_eq!(ratings.count_all().unwrap(), 0);
    }

    #[test]
    fn test_invalid_table_name() {
        let store = SqliteVersionStore::in_memory().unwrap();
        let err = store.collection::<String>("title; DROP TABLE x").err().unwrap();
        assert!(err.is_configuration());

        let store = SqliteVersionStore::in_memory()
            .unwrap()
            .with_table_prefix("bad-prefix");
        assert!(store.collection::<String>("title").is_err());
    }

    #[test]
    fn test_undecodable_value_is_serialization_error() {
        let store = SqliteVersionStore::in_memory().unwrap();
        let as_text = store.collection::<String>("field").unwrap();
        let as_number = store.collection::<u32>("field").unwrap();
        let owner = Uuid::new_v4();

        as_text
            .insert_many(&[Version::new(owner, Utc::now(), "not a number".to_string())])
            .unwrap();

        let err = as_number.query_owner(owner).unwrap_err();
        assert!(matches!(err, VersoError::Serialization(_)));
    }

    #[test]
    fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("versions.db");
        let owner = Uuid::new_v4();

        {
            let store = SqliteVersionStore::new(&path).unwrap();
            store
                .collection::<String>("title")
                .unwrap()
                .insert_many(&[Version::new(owner, Utc::now(), "kept".to_string())])
                .unwrap();
        }

        let store = SqliteVersionStore::new(&path).unwrap();
        let found = store.collection::<String>("title").unwrap().query_owner(owner).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].value(), "kept");
    }
}
