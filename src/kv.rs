//! Object-store adapter over an embedded SQLite file.
//!
//! Everything above this module sees only object-store primitives: named
//! stores keyed by an auto-increment `id`, secondary indexes over a single
//! record field, get/put/delete, ordered cursors over an index and exact
//! counts. Records are JSON objects. SQLite is used purely as the durable
//! byte store; no layer above issues SQL.

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::error::{StoreError, StoreResult};

/// Index entries fetched per cursor round trip.
const CURSOR_BATCH: i64 = 64;

const TAG_NULL: u8 = 0x00;
const TAG_NUMBER: u8 = 0x10;
const TAG_TEXT: u8 = 0x20;

/// Sorts above every encoded key.
const KEY_CEILING: [u8; 2] = [0xFF, 0xFF];

const ENGINE_SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS kv_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS kv_stores (
        name TEXT PRIMARY KEY,
        next_id INTEGER NOT NULL DEFAULT 1
    );

    CREATE TABLE IF NOT EXISTS kv_indexes (
        store TEXT NOT NULL REFERENCES kv_stores(name),
        name TEXT NOT NULL,
        key_path TEXT NOT NULL,
        is_unique INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (store, name)
    );

    CREATE TABLE IF NOT EXISTS kv_records (
        store TEXT NOT NULL,
        id INTEGER NOT NULL,
        body TEXT NOT NULL,
        PRIMARY KEY (store, id)
    );

    CREATE TABLE IF NOT EXISTS kv_index_entries (
        store TEXT NOT NULL,
        idx TEXT NOT NULL,
        key BLOB NOT NULL,
        id INTEGER NOT NULL,
        PRIMARY KEY (store, idx, key, id)
    );

    CREATE INDEX IF NOT EXISTS kv_index_entries_by_record ON kv_index_entries(store, id);
"#;

/// The key a record contributes to an index.
///
/// Ordering: `Null` < numbers < strings. Absent, null and non-scalar field
/// values all map to `Null`.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexKey {
    Null,
    Number(f64),
    Text(String),
}

impl IndexKey {
    pub fn from_field(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Number(n)) => n.as_f64().map(IndexKey::Number).unwrap_or(IndexKey::Null),
            Some(Value::String(s)) => IndexKey::Text(s.clone()),
            _ => IndexKey::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, IndexKey::Null)
    }

    /// Order-preserving byte encoding: comparing encodings bytewise gives
    /// the same result as comparing keys.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            IndexKey::Null => vec![TAG_NULL],
            IndexKey::Number(n) => {
                let bits = n.to_bits();
                let ordered = if bits >> 63 == 1 { !bits } else { bits | (1 << 63) };
                let mut out = Vec::with_capacity(9);
                out.push(TAG_NUMBER);
                out.extend_from_slice(&ordered.to_be_bytes());
                out
            }
            IndexKey::Text(s) => {
                let mut out = Vec::with_capacity(s.len() + 1);
                out.push(TAG_TEXT);
                out.extend_from_slice(s.as_bytes());
                out
            }
        }
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKey::Null => write!(f, "null"),
            IndexKey::Number(n) => write!(f, "{}", n),
            IndexKey::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for IndexKey {
    fn from(value: &str) -> Self {
        IndexKey::Text(value.to_string())
    }
}

impl From<String> for IndexKey {
    fn from(value: String) -> Self {
        IndexKey::Text(value)
    }
}

impl From<i64> for IndexKey {
    fn from(value: i64) -> Self {
        IndexKey::Number(value as f64)
    }
}

impl From<f64> for IndexKey {
    fn from(value: f64) -> Self {
        IndexKey::Number(value)
    }
}

/// Inclusive bounds over index keys. `None` leaves that side open.
#[derive(Debug, Clone, Default)]
pub struct KeyRange {
    lower: Option<IndexKey>,
    upper: Option<IndexKey>,
}

impl KeyRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only(key: impl Into<IndexKey>) -> Self {
        let key = key.into();
        Self {
            lower: Some(key.clone()),
            upper: Some(key),
        }
    }

    pub fn bound(lower: Option<IndexKey>, upper: Option<IndexKey>) -> Self {
        Self { lower, upper }
    }

    fn encoded(&self) -> (Vec<u8>, Vec<u8>) {
        let lower = self.lower.as_ref().map(IndexKey::encode).unwrap_or_default();
        let upper = self
            .upper
            .as_ref()
            .map(IndexKey::encode)
            .unwrap_or_else(|| KEY_CEILING.to_vec());
        (lower, upper)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone)]
struct StoredIndex {
    name: String,
    key_path: String,
    unique: bool,
}

pub struct Kv {
    conn: Connection,
}

impl Kv {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(ENGINE_SCHEMA)?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    // --- Metadata ---

    pub fn meta(&self, key: &str) -> StoreResult<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv_meta WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    pub fn set_meta(&self, key: &str, value: &str) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO kv_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    // --- Stores and indexes ---

    pub fn has_store(&self, store: &str) -> StoreResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row("SELECT 1 FROM kv_stores WHERE name = ?1", [store], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    /// Creates the store if it is missing. Returns whether it was created.
    pub fn create_store(&self, store: &str) -> StoreResult<bool> {
        let created = self
            .conn
            .execute("INSERT OR IGNORE INTO kv_stores (name) VALUES (?1)", [store])?;
        Ok(created == 1)
    }

    pub fn store_names(&self) -> StoreResult<Vec<String>> {
        let mut stmt = self.conn.prepare_cached("SELECT name FROM kv_stores ORDER BY name")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<String>, _>>()?)
    }

    pub fn index_names(&self, store: &str) -> StoreResult<Vec<String>> {
        Ok(self.indexes(store)?.into_iter().map(|index| index.name).collect())
    }

    pub fn has_index(&self, store: &str, index: &str) -> StoreResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM kv_indexes WHERE store = ?1 AND name = ?2",
                params![store, index],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Creates the index if it is missing and indexes every existing record.
    /// Returns whether it was created.
    pub fn create_index(
        &self,
        store: &str,
        name: &str,
        key_path: &str,
        unique: bool,
    ) -> StoreResult<bool> {
        self.require_store(store)?;
        if self.has_index(store, name)? {
            return Ok(false);
        }

        let index = StoredIndex {
            name: name.to_string(),
            key_path: key_path.to_string(),
            unique,
        };

        self.atomically(|| {
            self.conn.execute(
                "INSERT INTO kv_indexes (store, name, key_path, is_unique) VALUES (?1, ?2, ?3, ?4)",
                params![store, name, key_path, unique],
            )?;
            for record in self.get_all(store)? {
                let id = record_id(&record).ok_or_else(|| {
                    StoreError::StoreUnavailable(format!("record in '{}' has no id", store))
                })?;
                let key = IndexKey::from_field(record.get(key_path));
                self.check_unique(store, &index, &key, id)?;
                self.insert_entry(store, name, &key, id)?;
            }
            Ok(())
        })?;
        Ok(true)
    }

    fn indexes(&self, store: &str) -> StoreResult<Vec<StoredIndex>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT name, key_path, is_unique FROM kv_indexes WHERE store = ?1 ORDER BY name",
        )?;
        let rows = stmt.query_map([store], |row| {
            Ok(StoredIndex {
                name: row.get(0)?,
                key_path: row.get(1)?,
                unique: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn require_store(&self, store: &str) -> StoreResult<()> {
        if self.has_store(store)? {
            Ok(())
        } else {
            Err(StoreError::StoreUnavailable(format!(
                "object store '{}' does not exist",
                store
            )))
        }
    }

    fn require_index(&self, store: &str, index: &str) -> StoreResult<()> {
        if self.has_index(store, index)? {
            Ok(())
        } else {
            Err(StoreError::StoreUnavailable(format!(
                "index '{}' does not exist on '{}'",
                index, store
            )))
        }
    }

    // --- Records ---

    pub fn get(&self, store: &str, id: i64) -> StoreResult<Option<Value>> {
        let body: Option<String> = self
            .conn
            .prepare_cached("SELECT body FROM kv_records WHERE store = ?1 AND id = ?2")?
            .query_row(params![store, id], |row| row.get(0))
            .optional()?;
        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    /// Inserts a record. Fails if a record with the same id already exists.
    pub fn add(&self, store: &str, record: Value) -> StoreResult<i64> {
        self.write(store, record, false)
    }

    /// Inserts or replaces a record. A record without an `id` gets the next
    /// generated one.
    pub fn put(&self, store: &str, record: Value) -> StoreResult<i64> {
        self.write(store, record, true)
    }

    fn write(&self, store: &str, mut record: Value, overwrite: bool) -> StoreResult<i64> {
        self.require_store(store)?;
        if !record.is_object() {
            return Err(StoreError::constraint(store, "record must be a JSON object"));
        }
        let explicit_id = match record.get("id") {
            None | Some(Value::Null) => None,
            Some(value) => match value.as_i64() {
                Some(id) if id > 0 => Some(id),
                _ => {
                    return Err(StoreError::constraint(
                        store,
                        format!("id must be a positive integer, got {}", value),
                    ));
                }
            },
        };

        self.atomically(|| {
            let id = match explicit_id {
                Some(id) => {
                    if !overwrite && self.exists(store, id)? {
                        return Err(StoreError::constraint(
                            store,
                            format!("a record with id {} already exists", id),
                        ));
                    }
                    self.bump_generator(store, id)?;
                    id
                }
                None => self.next_id(store)?,
            };
            record["id"] = Value::from(id);

            let indexes = self.indexes(store)?;
            let keys: Vec<IndexKey> = indexes
                .iter()
                .map(|index| IndexKey::from_field(record.get(&index.key_path)))
                .collect();
            for (index, key) in indexes.iter().zip(&keys) {
                self.check_unique(store, index, key, id)?;
            }

            let body = serde_json::to_string(&record)?;
            let updated = self.conn.execute(
                "UPDATE kv_records SET body = ?3 WHERE store = ?1 AND id = ?2",
                params![store, id, body],
            )?;
            if updated == 0 {
                self.conn.execute(
                    "INSERT INTO kv_records (store, id, body) VALUES (?1, ?2, ?3)",
                    params![store, id, body],
                )?;
            }

            self.conn.execute(
                "DELETE FROM kv_index_entries WHERE store = ?1 AND id = ?2",
                params![store, id],
            )?;
            for (index, key) in indexes.iter().zip(&keys) {
                self.insert_entry(store, &index.name, key, id)?;
            }
            Ok(id)
        })
    }

    fn check_unique(
        &self,
        store: &str,
        index: &StoredIndex,
        key: &IndexKey,
        id: i64,
    ) -> StoreResult<()> {
        if !index.unique || key.is_null() {
            return Ok(());
        }
        let holder: Option<i64> = self
            .conn
            .prepare_cached(
                "SELECT id FROM kv_index_entries
                 WHERE store = ?1 AND idx = ?2 AND key = ?3 AND id != ?4 LIMIT 1",
            )?
            .query_row(params![store, index.name, key.encode(), id], |row| row.get(0))
            .optional()?;
        match holder {
            Some(other) => Err(StoreError::constraint(
                store,
                format!("{} '{}' is already used by #{}", index.key_path, key, other),
            )),
            None => Ok(()),
        }
    }

    fn insert_entry(&self, store: &str, index: &str, key: &IndexKey, id: i64) -> StoreResult<()> {
        self.conn
            .prepare_cached(
                "INSERT INTO kv_index_entries (store, idx, key, id) VALUES (?1, ?2, ?3, ?4)",
            )?
            .execute(params![store, index, key.encode(), id])?;
        Ok(())
    }

    fn exists(&self, store: &str, id: i64) -> StoreResult<bool> {
        let found: Option<i64> = self
            .conn
            .prepare_cached("SELECT 1 FROM kv_records WHERE store = ?1 AND id = ?2")?
            .query_row(params![store, id], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    fn next_id(&self, store: &str) -> StoreResult<i64> {
        let id: i64 = self.conn.query_row(
            "SELECT next_id FROM kv_stores WHERE name = ?1",
            [store],
            |row| row.get(0),
        )?;
        self.conn.execute(
            "UPDATE kv_stores SET next_id = ?2 WHERE name = ?1",
            params![store, id + 1],
        )?;
        Ok(id)
    }

    fn bump_generator(&self, store: &str, used: i64) -> StoreResult<()> {
        self.conn.execute(
            "UPDATE kv_stores SET next_id = MAX(next_id, ?2) WHERE name = ?1",
            params![store, used + 1],
        )?;
        Ok(())
    }

    /// Removes a record and its index entries. Returns whether it existed.
    pub fn delete(&self, store: &str, id: i64) -> StoreResult<bool> {
        self.require_store(store)?;
        self.atomically(|| {
            self.conn.execute(
                "DELETE FROM kv_index_entries WHERE store = ?1 AND id = ?2",
                params![store, id],
            )?;
            let removed = self.conn.execute(
                "DELETE FROM kv_records WHERE store = ?1 AND id = ?2",
                params![store, id],
            )?;
            Ok(removed == 1)
        })
    }

    /// Removes every record of a store. The id generator is left untouched.
    pub fn clear(&self, store: &str) -> StoreResult<usize> {
        self.require_store(store)?;
        self.atomically(|| {
            self.conn
                .execute("DELETE FROM kv_index_entries WHERE store = ?1", [store])?;
            let removed = self
                .conn
                .execute("DELETE FROM kv_records WHERE store = ?1", [store])?;
            Ok(removed)
        })
    }

    /// All records of a store in primary key order.
    pub fn get_all(&self, store: &str) -> StoreResult<Vec<Value>> {
        self.require_store(store)?;
        let mut stmt = self
            .conn
            .prepare_cached("SELECT body FROM kv_records WHERE store = ?1 ORDER BY id")?;
        let bodies = stmt
            .query_map([store], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        bodies
            .iter()
            .map(|body| serde_json::from_str(body).map_err(StoreError::from))
            .collect()
    }

    pub fn count(&self, store: &str) -> StoreResult<usize> {
        self.require_store(store)?;
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM kv_records WHERE store = ?1",
            [store],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Number of index entries whose key falls in `range`.
    pub fn count_index(&self, store: &str, index: &str, range: &KeyRange) -> StoreResult<usize> {
        self.require_index(store, index)?;
        let (lower, upper) = range.encoded();
        let count: i64 = self
            .conn
            .prepare_cached(
                "SELECT COUNT(*) FROM kv_index_entries
                 WHERE store = ?1 AND idx = ?2 AND key >= ?3 AND key <= ?4",
            )?
            .query_row(params![store, index, lower, upper], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Cursor over every record of a store in primary key order.
    pub fn scan(&self, store: &str, direction: ScanDirection) -> StoreResult<Cursor<'_>> {
        self.require_store(store)?;
        Ok(Cursor::new(self, store, CursorSource::Primary, direction))
    }

    /// Cursor over the records whose `index` key falls in `range`, ordered
    /// by (index key, id).
    pub fn index_cursor(
        &self,
        store: &str,
        index: &str,
        range: KeyRange,
        direction: ScanDirection,
    ) -> StoreResult<Cursor<'_>> {
        self.require_index(store, index)?;
        let (lower, upper) = range.encoded();
        let source = CursorSource::Index {
            name: index.to_string(),
            lower,
            upper,
        };
        Ok(Cursor::new(self, store, source, direction))
    }

    /// Runs `work` as one unit: either every write inside it lands or none do.
    pub fn batch<T>(&self, work: impl FnOnce(&Self) -> StoreResult<T>) -> StoreResult<T> {
        self.atomically(|| work(self))
    }

    // Savepoints nest, so single writes inside a batch can fail and roll
    // back on their own without aborting the enclosing batch.
    fn atomically<T>(&self, work: impl FnOnce() -> StoreResult<T>) -> StoreResult<T> {
        self.conn.execute_batch("SAVEPOINT kv_write")?;
        match work() {
            Ok(value) => {
                self.conn.execute_batch("RELEASE kv_write")?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = self
                    .conn
                    .execute_batch("ROLLBACK TO kv_write; RELEASE kv_write")
                {
                    tracing::error!("failed to roll back write: {}", rollback);
                }
                Err(err)
            }
        }
    }

    fn page_entries(
        &self,
        store: &str,
        source: &CursorSource,
        direction: ScanDirection,
        after: &(Vec<u8>, i64),
    ) -> StoreResult<Vec<(Vec<u8>, i64)>> {
        let (position_key, position_id) = after;
        match source {
            CursorSource::Primary => {
                let sql = match direction {
                    ScanDirection::Ascending => {
                        "SELECT id FROM kv_records WHERE store = ?1 AND id > ?2
                         ORDER BY id ASC LIMIT ?3"
                    }
                    ScanDirection::Descending => {
                        "SELECT id FROM kv_records WHERE store = ?1 AND id < ?2
                         ORDER BY id DESC LIMIT ?3"
                    }
                };
                let mut stmt = self.conn.prepare_cached(sql)?;
                let rows = stmt.query_map(params![store, position_id, CURSOR_BATCH], |row| {
                    Ok((Vec::new(), row.get(0)?))
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            }
            CursorSource::Index { name, lower, upper } => {
                let sql = match direction {
                    ScanDirection::Ascending => {
                        "SELECT key, id FROM kv_index_entries
                         WHERE store = ?1 AND idx = ?2 AND key >= ?3 AND key <= ?4
                           AND (key > ?5 OR (key = ?5 AND id > ?6))
                         ORDER BY key ASC, id ASC LIMIT ?7"
                    }
                    ScanDirection::Descending => {
                        "SELECT key, id FROM kv_index_entries
                         WHERE store = ?1 AND idx = ?2 AND key >= ?3 AND key <= ?4
                           AND (key < ?5 OR (key = ?5 AND id < ?6))
                         ORDER BY key DESC, id DESC LIMIT ?7"
                    }
                };
                let mut stmt = self.conn.prepare_cached(sql)?;
                let rows = stmt.query_map(
                    params![store, name, lower, upper, position_key, position_id, CURSOR_BATCH],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            }
        }
    }
}

fn record_id(record: &Value) -> Option<i64> {
    record.get("id").and_then(Value::as_i64)
}

enum CursorSource {
    Primary,
    Index {
        name: String,
        lower: Vec<u8>,
        upper: Vec<u8>,
    },
}

/// Lazily walks a store or index, fetching entries in small batches so a
/// caller that stops early never reads the rest.
pub struct Cursor<'a> {
    kv: &'a Kv,
    store: String,
    source: CursorSource,
    direction: ScanDirection,
    position: (Vec<u8>, i64),
    pending: VecDeque<(Vec<u8>, i64)>,
    exhausted: bool,
    visited: usize,
}

impl<'a> Cursor<'a> {
    fn new(kv: &'a Kv, store: &str, source: CursorSource, direction: ScanDirection) -> Self {
        let position = match direction {
            ScanDirection::Ascending => (Vec::new(), i64::MIN),
            ScanDirection::Descending => (KEY_CEILING.to_vec(), i64::MAX),
        };
        Self {
            kv,
            store: store.to_string(),
            source,
            direction,
            position,
            pending: VecDeque::new(),
            exhausted: false,
            visited: 0,
        }
    }

    /// Entries visited so far, matching or not.
    pub fn visited(&self) -> usize {
        self.visited
    }

    fn refill(&mut self) -> StoreResult<()> {
        let entries =
            self.kv
                .page_entries(&self.store, &self.source, self.direction, &self.position)?;
        if (entries.len() as i64) < CURSOR_BATCH {
            self.exhausted = true;
        }
        if let Some(last) = entries.last() {
            self.position = last.clone();
        }
        self.pending.extend(entries);
        Ok(())
    }
}

impl Iterator for Cursor<'_> {
    type Item = StoreResult<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.pending.is_empty() {
                if self.exhausted {
                    return None;
                }
                if let Err(err) = self.refill() {
                    self.exhausted = true;
                    return Some(Err(err));
                }
                continue;
            }

            let (_, id) = self.pending.pop_front()?;
            self.visited += 1;
            match self.kv.get(&self.store, id) {
                Ok(Some(record)) => return Some(Ok(record)),
                // Removed after its entry was fetched.
                Ok(None) => continue,
                Err(err) => return Some(Err(err)),
            }
        }
    }
}
