use std::collections::HashMap;

use crate::db::Database;
use crate::error::StoreResult;
use crate::models::UNKNOWN_COMPANY;

/// Company id -> name lookup used when rendering jobs.
///
/// Owned by whoever renders company names and passed explicitly to the
/// operations that create, rename or delete companies.
#[derive(Debug, Clone, Default)]
pub struct CompanyNames {
    names: HashMap<i64, String>,
}

impl CompanyNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(db: &Database) -> StoreResult<Self> {
        let names = db
            .list_companies()?
            .into_iter()
            .filter_map(|company| company.id.map(|id| (id, company.name)))
            .collect();
        Ok(Self { names })
    }

    pub fn register(&mut self, id: i64, name: impl Into<String>) {
        self.names.insert(id, name.into());
    }

    pub fn forget(&mut self, id: i64) {
        self.names.remove(&id);
    }

    pub fn get(&self, id: i64) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    /// The company's name, or [`UNKNOWN_COMPANY`] when the job has no
    /// company or points at one that no longer exists.
    pub fn resolve(&self, company_id: Option<i64>) -> &str {
        company_id
            .and_then(|id| self.get(id))
            .unwrap_or(UNKNOWN_COMPANY)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
