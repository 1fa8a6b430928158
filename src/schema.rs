//! Store and index definitions, created or upgraded once at startup.

use tracing::{info, warn};

use crate::error::{StoreError, StoreResult};
use crate::kv::Kv;

pub const COMPANIES: &str = "companies";
pub const PROFILES: &str = "profiles";
pub const PEOPLE: &str = "people";
pub const JOBS: &str = "jobs";

/// Bumped whenever a store or index is added.
pub const SCHEMA_VERSION: i64 = 2;

const VERSION_KEY: &str = "schema_version";

#[derive(Debug, Clone, Copy)]
pub struct IndexDef {
    pub name: &'static str,
    pub key_path: &'static str,
    pub unique: bool,
    /// Schema version that introduced the index.
    pub since: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct StoreDef {
    pub name: &'static str,
    pub indexes: &'static [IndexDef],
}

const fn index(name: &'static str, since: i64) -> IndexDef {
    IndexDef {
        name,
        key_path: name,
        unique: false,
        since,
    }
}

pub const STORES: [StoreDef; 4] = [
    StoreDef {
        name: COMPANIES,
        indexes: &[IndexDef {
            name: "name",
            key_path: "name",
            unique: true,
            since: 1,
        }],
    },
    StoreDef {
        name: PROFILES,
        indexes: &[],
    },
    StoreDef {
        name: PEOPLE,
        indexes: &[],
    },
    StoreDef {
        name: JOBS,
        indexes: &[
            index("status", 1),
            index("company_id", 1),
            index("profile_id", 1),
            index("created_at", 1),
            index("salary", 1),
            index("match_percentage", 1),
            index("title", 1),
            index("location", 2),
        ],
    },
];

/// What a call to [`ensure_schema`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaReport {
    /// Version recorded before this call; `None` for a fresh file.
    pub previous_version: Option<i64>,
    pub version: i64,
    pub stores_created: Vec<String>,
    pub indexes_created: Vec<String>,
}

impl SchemaReport {
    pub fn is_unchanged(&self) -> bool {
        self.stores_created.is_empty() && self.indexes_created.is_empty()
    }
}

/// Creates any missing store or index. Safe to call on every startup:
/// existing records are never touched, and indexes added by an upgrade are
/// filled from the records already present.
pub fn ensure_schema(kv: &Kv) -> StoreResult<SchemaReport> {
    let previous_version = match kv.meta(VERSION_KEY)? {
        Some(raw) => Some(raw.parse::<i64>().map_err(|_| {
            StoreError::StoreUnavailable(format!("unreadable schema version '{}'", raw))
        })?),
        None => None,
    };

    if let Some(found) = previous_version {
        if found > SCHEMA_VERSION {
            warn!(
                "database schema version {} is newer than supported version {}; continuing",
                found, SCHEMA_VERSION
            );
        }
    }

    let mut report = SchemaReport {
        previous_version,
        version: previous_version.unwrap_or(0).max(SCHEMA_VERSION),
        ..Default::default()
    };

    kv.batch(|kv| {
        for store in &STORES {
            if kv.create_store(store.name)? {
                info!("created store '{}'", store.name);
                report.stores_created.push(store.name.to_string());
            }
            for def in store.indexes {
                if kv.create_index(store.name, def.name, def.key_path, def.unique)? {
                    info!(
                        "created index '{}.{}' (schema v{})",
                        store.name, def.name, def.since
                    );
                    report
                        .indexes_created
                        .push(format!("{}.{}", store.name, def.name));
                }
            }
        }
        if previous_version != Some(report.version) {
            kv.set_meta(VERSION_KEY, &report.version.to_string())?;
        }
        Ok(())
    })?;

    if let Some(from) = previous_version {
        if from < SCHEMA_VERSION {
            info!("upgraded schema from v{} to v{}", from, SCHEMA_VERSION);
        }
    }

    Ok(report)
}
