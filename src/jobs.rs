use tracing::debug;

use crate::db::{decode, encode, non_blank, now_timestamp, Database};
use crate::error::{StoreError, StoreResult};
use crate::kv::{KeyRange, ScanDirection};
use crate::models::{CategorizedKeywords, Job, JobStatus, Profile};
use crate::schema::{JOBS, PROFILES};

impl Database {
    // --- Job operations ---

    /// Inserts a job and returns its id. `created_at` is stamped here and
    /// never changes afterwards.
    pub fn create_job(&self, job: &Job) -> StoreResult<i64> {
        let mut job = job.clone();
        job.id = None;
        self.validate_job(&mut job)?;
        if job.created_at.is_empty() {
            job.created_at = now_timestamp();
        }
        self.kv().add(JOBS, encode(&job)?)
    }

    pub fn get_job(&self, id: i64) -> StoreResult<Option<Job>> {
        self.fetch(JOBS, id)
    }

    /// Full replace keyed by `job.id`; callers merge their edits into the
    /// stored record first. Switching `profile_id` drops the match result,
    /// which belonged to the previous profile.
    pub fn update_job(&self, job: &Job) -> StoreResult<()> {
        let id = job
            .id
            .ok_or_else(|| StoreError::constraint(JOBS, "update requires an id"))?;
        let existing: Job = self.fetch_existing(JOBS, id)?;

        let mut job = job.clone();
        job.created_at = existing.created_at;
        if job.profile_id != existing.profile_id {
            job.clear_match();
        }
        self.validate_job(&mut job)?;
        self.kv().put(JOBS, encode(&job)?)?;
        Ok(())
    }

    pub fn delete_job(&self, id: i64) -> StoreResult<()> {
        if self.kv().delete(JOBS, id)? {
            Ok(())
        } else {
            Err(StoreError::not_found(JOBS, id))
        }
    }

    pub fn list_jobs(&self) -> StoreResult<Vec<Job>> {
        self.fetch_all(JOBS)
    }

    pub fn jobs_for_company(&self, company_id: i64) -> StoreResult<Vec<Job>> {
        self.jobs_where("company_id", company_id)
    }

    pub fn jobs_for_profile(&self, profile_id: i64) -> StoreResult<Vec<Job>> {
        self.jobs_where("profile_id", profile_id)
    }

    /// Exact-match scan of one job index.
    fn jobs_where(&self, index: &str, value: i64) -> StoreResult<Vec<Job>> {
        self.kv()
            .index_cursor(JOBS, index, KeyRange::only(value), ScanDirection::Ascending)?
            .map(|record| decode(JOBS, record?))
            .collect()
    }

    /// Moves a job to another board column.
    pub fn set_job_status(&self, id: i64, status: JobStatus) -> StoreResult<()> {
        let mut job: Job = self.fetch_existing(JOBS, id)?;
        job.status = status;
        self.update_job(&job)
    }

    /// Links the job to a profile, or unlinks it with `None`. Any previous
    /// match result is cleared.
    pub fn assign_profile(&self, id: i64, profile_id: Option<i64>) -> StoreResult<()> {
        let mut job: Job = self.fetch_existing(JOBS, id)?;
        job.profile_id = profile_id;
        job.clear_match();
        self.update_job(&job)
    }

    /// Records how well the linked profile matches the job.
    pub fn set_job_match(&self, id: i64, percentage: u8, justification: &str) -> StoreResult<()> {
        let mut job: Job = self.fetch_existing(JOBS, id)?;
        if job.profile_id.is_none() {
            return Err(StoreError::constraint(
                JOBS,
                format!("job #{} has no profile to match against", id),
            ));
        }
        job.match_percentage = Some(percentage);
        job.match_justification = Some(justification.to_string());
        self.update_job(&job)
    }

    pub fn set_job_keywords(&self, id: i64, keywords: &CategorizedKeywords) -> StoreResult<()> {
        let mut job: Job = self.fetch_existing(JOBS, id)?;
        job.ai_keywords = if keywords.is_empty() {
            None
        } else {
            Some(serde_json::to_string(keywords)?)
        };
        self.update_job(&job)
    }

    /// Number of jobs in each status, in board order.
    pub fn status_counts(&self) -> StoreResult<Vec<(JobStatus, usize)>> {
        JobStatus::ALL
            .into_iter()
            .map(|status| Ok((status, self.count_jobs(status)?)))
            .collect()
    }

    /// One board column, newest first.
    pub fn jobs_by_status(&self, status: JobStatus) -> StoreResult<Vec<Job>> {
        self.kv()
            .index_cursor(
                JOBS,
                "status",
                KeyRange::only(status.as_str()),
                ScanDirection::Descending,
            )?
            .map(|record| decode(JOBS, record?))
            .collect()
    }

    pub(crate) fn validate_job(&self, job: &mut Job) -> StoreResult<()> {
        job.title = non_blank(Some(job.title.as_str()))
            .ok_or_else(|| StoreError::constraint(JOBS, "job title is required"))?
            .to_string();

        match (job.match_percentage, job.match_justification.as_deref()) {
            (Some(pct), Some(_)) if pct > 100 => {
                return Err(StoreError::constraint(
                    JOBS,
                    format!("match percentage must be 0-100, got {}", pct),
                ));
            }
            (Some(_), Some(_)) | (None, None) => {}
            _ => {
                return Err(StoreError::constraint(
                    JOBS,
                    "match percentage and justification must be set together",
                ));
            }
        }

        if let Some(profile_id) = job.profile_id {
            if self.fetch::<Profile>(PROFILES, profile_id)?.is_none() {
                return Err(StoreError::constraint(
                    JOBS,
                    format!("profile #{} does not exist", profile_id),
                ));
            }
        } else if job.match_percentage.is_some() {
            return Err(StoreError::constraint(
                JOBS,
                "a match result requires a linked profile",
            ));
        }
        Ok(())
    }
}

/// Parses a job's stored keywords. Unreadable keyword blobs read as `None`.
pub fn job_keywords(job: &Job) -> Option<CategorizedKeywords> {
    let raw = job.ai_keywords.as_deref()?;
    match serde_json::from_str(raw) {
        Ok(keywords) => Some(keywords),
        Err(e) => {
            debug!("ignoring unreadable keywords on job {:?}: {}", job.id, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Company;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn test_create_job_defaults() {
        let db = setup();
        let id = db.create_job(&Job::new("Engineer")).unwrap();
        let job = db.get_job(id).unwrap().unwrap();
        assert_eq!(job.id, Some(id));
        assert_eq!(job.status, JobStatus::Bookmarked);
        assert!(!job.created_at.is_empty());
        assert_eq!(job.profile_id, None);
    }

    #[test]
    fn test_job_title_is_required() {
        let db = setup();
        assert!(db.create_job(&Job::new("  ")).unwrap_err().is_constraint_violation());
    }

    #[test]
    fn test_job_cannot_reference_missing_profile() {
        let db = setup();
        let mut job = Job::new("Engineer");
        job.profile_id = Some(3);
        assert!(db.create_job(&job).unwrap_err().is_constraint_violation());
    }

    #[test]
    fn test_job_may_reference_missing_company() {
        let db = setup();
        let mut job = Job::new("Engineer");
        job.company_id = Some(42);
        let id = db.create_job(&job).unwrap();
        assert_eq!(db.get_job(id).unwrap().unwrap().company_id, Some(42));
    }

    #[test]
    fn test_match_fields_must_be_set_together() {
        let db = setup();
        let profile = db.create_profile(&Profile::new("A", "resume")).unwrap();
        let mut job = Job::new("Engineer");
        job.profile_id = Some(profile);
        job.match_percentage = Some(80);
        assert!(db.create_job(&job).unwrap_err().is_constraint_violation());

        job.match_justification = Some("good fit".into());
        db.create_job(&job).unwrap();

        job.match_percentage = Some(101);
        assert!(db.create_job(&job).unwrap_err().is_constraint_violation());
    }

    #[test]
    fn test_update_preserves_created_at() {
        let db = setup();
        let id = db.create_job(&Job::new("Engineer")).unwrap();
        let original = db.get_job(id).unwrap().unwrap();

        let mut edited = original.clone();
        edited.title = "Senior Engineer".into();
        edited.created_at = String::new();
        db.update_job(&edited).unwrap();

        let stored = db.get_job(id).unwrap().unwrap();
        assert_eq!(stored.title, "Senior Engineer");
        assert_eq!(stored.created_at, original.created_at);
    }

    #[test]
    fn test_changing_profile_clears_match() {
        let db = setup();
        let first = db.create_profile(&Profile::new("A", "a")).unwrap();
        let second = db.create_profile(&Profile::new("B", "b")).unwrap();
        let id = db.create_job(&Job::new("Engineer")).unwrap();

        db.assign_profile(id, Some(first)).unwrap();
        db.set_job_match(id, 72, "solid overlap").unwrap();
        let job = db.get_job(id).unwrap().unwrap();
        assert_eq!(job.match_percentage, Some(72));

        let mut switched = job.clone();
        switched.profile_id = Some(second);
        db.update_job(&switched).unwrap();

        let stored = db.get_job(id).unwrap().unwrap();
        assert_eq!(stored.profile_id, Some(second));
        assert_eq!(stored.match_percentage, None);
        assert_eq!(stored.match_justification, None);
    }

    #[test]
    fn test_match_requires_linked_profile() {
        let db = setup();
        let id = db.create_job(&Job::new("Engineer")).unwrap();
        assert!(db.set_job_match(id, 50, "meh").unwrap_err().is_constraint_violation());
    }

    #[test]
    fn test_update_missing_job_is_not_found() {
        let db = setup();
        let mut job = Job::new("Ghost");
        job.id = Some(9);
        assert!(db.update_job(&job).unwrap_err().is_not_found());
        assert!(db.delete_job(9).unwrap_err().is_not_found());
        assert!(db.set_job_status(9, JobStatus::Applied).unwrap_err().is_not_found());
    }

    #[test]
    fn test_jobs_by_foreign_key() {
        let db = setup();
        let acme = db.create_company(&Company::named("Acme")).unwrap();
        let globex = db.create_company(&Company::named("Globex")).unwrap();
        for (title, company) in [("A", acme), ("B", globex), ("C", acme)] {
            let mut job = Job::new(title);
            job.company_id = Some(company);
            db.create_job(&job).unwrap();
        }
        let titles: Vec<String> = db
            .jobs_for_company(acme)
            .unwrap()
            .into_iter()
            .map(|j| j.title)
            .collect();
        assert_eq!(titles, vec!["A", "C"]);
        assert!(db.jobs_for_profile(1).unwrap().is_empty());
    }

    #[test]
    fn test_status_moves_and_counts() {
        let db = setup();
        let a = db.create_job(&Job::new("A")).unwrap();
        let b = db.create_job(&Job::new("B")).unwrap();
        db.create_job(&Job::new("C")).unwrap();
        db.set_job_status(a, JobStatus::Applied).unwrap();
        db.set_job_status(b, JobStatus::Applied).unwrap();

        let counts = db.status_counts().unwrap();
        assert_eq!(counts[0], (JobStatus::Bookmarked, 1));
        assert_eq!(counts[2], (JobStatus::Applied, 2));
        assert_eq!(counts.iter().map(|(_, n)| n).sum::<usize>(), 3);

        let column: Vec<i64> = db
            .jobs_by_status(JobStatus::Applied)
            .unwrap()
            .into_iter()
            .filter_map(|j| j.id)
            .collect();
        assert_eq!(column, vec![b, a]);
    }

    #[test]
    fn test_keywords_round_trip_through_job() {
        let db = setup();
        let id = db.create_job(&Job::new("Engineer")).unwrap();
        let keywords = CategorizedKeywords {
            mandatory: vec!["Rust".into(), "SQL".into()],
            nice_to_have: vec!["Kubernetes".into()],
        };
        db.set_job_keywords(id, &keywords).unwrap();

        let job = db.get_job(id).unwrap().unwrap();
        assert_eq!(job_keywords(&job), Some(keywords));

        db.set_job_keywords(id, &CategorizedKeywords::default()).unwrap();
        assert_eq!(db.get_job(id).unwrap().unwrap().ai_keywords, None);
    }

    #[test]
    fn test_unreadable_keywords_are_ignored() {
        let mut job = Job::new("Engineer");
        job.ai_keywords = Some("not json".into());
        assert_eq!(job_keywords(&job), None);
    }
}
