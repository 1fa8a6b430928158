//! Whole-database export and restore.
//!
//! The document is a JSON object with exactly four arrays, `companies`,
//! `profiles`, `people` and `jobs`, holding the records with every field
//! present. Restoring clears each store and reloads it; records that fail to
//! load are skipped and reported instead of aborting the restore.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::{info, warn};

use crate::db::{encode, Database};
use crate::error::{StoreError, StoreResult};
use crate::models::{Job, Person, Profile};
use crate::schema::{COMPANIES, JOBS, PEOPLE, PROFILES};
use crate::{companies, profiles};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupDocument {
    #[serde(default)]
    pub companies: Vec<Value>,
    #[serde(default)]
    pub profiles: Vec<Value>,
    #[serde(default)]
    pub people: Vec<Value>,
    #[serde(default)]
    pub jobs: Vec<Value>,
}

impl BackupDocument {
    pub fn record_count(&self) -> usize {
        self.companies.len() + self.profiles.len() + self.people.len() + self.jobs.len()
    }
}

/// Outcome of a restore.
#[derive(Debug, Default)]
pub struct ImportReport {
    pub companies: usize,
    pub profiles: usize,
    pub people: usize,
    pub jobs: usize,
    /// One `MalformedImportRecord` per record that was not restored.
    pub skipped: Vec<StoreError>,
}

impl ImportReport {
    pub fn imported(&self) -> usize {
        self.companies + self.profiles + self.people + self.jobs
    }
}

/// `jobtrack-backup-YYYY-MM-DD.json` for today's date.
pub fn default_backup_file_name() -> String {
    format!(
        "jobtrack-backup-{}.json",
        chrono::Local::now().format("%Y-%m-%d")
    )
}

impl Database {
    pub fn export_all(&self) -> StoreResult<BackupDocument> {
        self.kv().batch(|_| {
            Ok(BackupDocument {
                companies: encode_all(&self.list_companies()?)?,
                profiles: encode_all(&self.list_profiles()?)?,
                people: encode_all(&self.list_people()?)?,
                jobs: encode_all(&self.list_jobs()?)?,
            })
        })
    }

    /// Replaces the contents of all four stores with `document`.
    pub fn import_all(&self, document: &BackupDocument) -> StoreResult<ImportReport> {
        let mut report = ImportReport::default();
        self.kv().batch(|kv| {
            for store in [COMPANIES, PROFILES, PEOPLE, JOBS] {
                kv.clear(store)?;
            }
            report.companies =
                self.restore(COMPANIES, &document.companies, &mut report.skipped, companies::normalize)?;
            report.profiles =
                self.restore(PROFILES, &document.profiles, &mut report.skipped, |p: &mut Profile| {
                    profiles::validate(p)
                })?;
            report.people =
                self.restore(PEOPLE, &document.people, &mut report.skipped, |_: &mut Person| Ok(()))?;
            report.jobs = self.restore_jobs(&document.jobs, &mut report.skipped)?;
            Ok(())
        })?;
        info!(
            "restored {} record(s), skipped {}",
            report.imported(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// Restored records go through the same checks as a create; a record
    /// that fails them is skipped.
    fn restore<T: Serialize + DeserializeOwned>(
        &self,
        store: &str,
        records: &[Value],
        skipped: &mut Vec<StoreError>,
        check: impl Fn(&mut T) -> StoreResult<()>,
    ) -> StoreResult<usize> {
        let mut restored = 0;
        for (position, raw) in records.iter().enumerate() {
            let outcome = parse_record::<T>(store, position, raw).and_then(|mut record| {
                check(&mut record).map_err(|e| reject(store, position, e))?;
                self.insert_restored(store, position, &record)
            });
            if skip_or_count(outcome, skipped)? {
                restored += 1;
            }
        }
        Ok(restored)
    }

    // Jobs go last so their profile references can be checked against the
    // restored profiles.
    fn restore_jobs(&self, records: &[Value], skipped: &mut Vec<StoreError>) -> StoreResult<usize> {
        let mut restored = 0;
        for (position, raw) in records.iter().enumerate() {
            let outcome = parse_record::<Job>(JOBS, position, raw).and_then(|mut job| {
                if let Some(profile_id) = job.profile_id {
                    if self.get_profile(profile_id)?.is_none() {
                        warn!(
                            "job entry {} referenced missing profile #{}; unlinking",
                            position, profile_id
                        );
                        job.profile_id = None;
                        job.clear_match();
                    }
                }
                self.validate_job(&mut job)
                    .map_err(|e| reject(JOBS, position, e))?;
                self.insert_restored(JOBS, position, &job)
            });
            if skip_or_count(outcome, skipped)? {
                restored += 1;
            }
        }
        Ok(restored)
    }

    fn insert_restored<T: Serialize>(&self, store: &str, position: usize, record: &T) -> StoreResult<()> {
        self.kv()
            .put(store, encode(record)?)
            .map(|_| ())
            .map_err(|e| reject(store, position, e))
    }

    pub fn export_to_file(&self, path: &Path) -> StoreResult<usize> {
        let document = self.export_all()?;
        let json = serde_json::to_string_pretty(&document)?;
        std::fs::write(path, json)?;
        Ok(document.record_count())
    }

    pub fn import_from_file(&self, path: &Path) -> StoreResult<ImportReport> {
        let raw = std::fs::read_to_string(path)?;
        let document: BackupDocument = serde_json::from_str(&raw).map_err(|e| {
            StoreError::MalformedImportRecord {
                store: "document".to_string(),
                position: 0,
                reason: e.to_string(),
            }
        })?;
        self.import_all(&document)
    }
}

fn encode_all<T: Serialize>(records: &[T]) -> StoreResult<Vec<Value>> {
    records.iter().map(encode).collect()
}

fn parse_record<T: DeserializeOwned>(store: &str, position: usize, raw: &Value) -> StoreResult<T> {
    serde_json::from_value(raw.clone()).map_err(|e| malformed(store, position, e.to_string()))
}

fn malformed(store: &str, position: usize, reason: impl Into<String>) -> StoreError {
    StoreError::MalformedImportRecord {
        store: store.to_string(),
        position,
        reason: reason.into(),
    }
}

/// Turns a constraint failure on one record into a skippable
/// `MalformedImportRecord`; anything else still aborts.
fn reject(store: &str, position: usize, err: StoreError) -> StoreError {
    match err {
        StoreError::ConstraintViolation { reason, .. } => malformed(store, position, reason),
        other => other,
    }
}

/// Ok(true) when the record landed, Ok(false) when it was skipped; engine
/// failures abort the restore.
fn skip_or_count(outcome: StoreResult<()>, skipped: &mut Vec<StoreError>) -> StoreResult<bool> {
    match outcome {
        Ok(()) => Ok(true),
        Err(err @ StoreError::MalformedImportRecord { .. }) => {
            warn!("skipping record: {}", err);
            skipped.push(err);
            Ok(false)
        }
        Err(err) => Err(err),
    }
}
