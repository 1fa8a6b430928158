//! Persistence and query core of a single-user job-application tracker.
//!
//! Companies, resume profiles, contacts and job postings live in four object
//! stores on an embedded key-value engine. Relational behaviour (unique
//! company names, job references to companies and profiles, filtered and
//! sorted paging) is built from single-index cursors and point reads.

pub mod backup;
pub mod cascade;
pub mod companies;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod kv;
pub mod models;
pub mod names;
pub mod people;
pub mod profiles;
pub mod query;
pub mod schema;

pub use backup::{BackupDocument, ImportReport};
pub use db::Database;
pub use error::{StoreError, StoreResult};
pub use models::{CategorizedKeywords, Company, Job, JobStatus, Person, Profile, UNKNOWN_COMPANY};
pub use names::CompanyNames;
pub use query::{JobPage, SortDirection, SortField, SortSpec};
