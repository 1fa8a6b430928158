//! Keeps jobs consistent with the companies and profiles they point at.
//!
//! Nothing in the engine enforces references. Profiles are unlinked from
//! their jobs before they go away; companies are not, and jobs left pointing
//! at a deleted company render as [`crate::models::UNKNOWN_COMPANY`].

use tracing::{info, warn};

use crate::db::{non_blank, Database};
use crate::error::{StoreError, StoreResult};
use crate::kv::KeyRange;
use crate::models::{Company, Job, Profile};
use crate::names::CompanyNames;
use crate::schema::{COMPANIES, JOBS, PROFILES};

impl Database {
    /// Unlinks every job from the profile, then deletes it. Returns the ids
    /// of the jobs that were unlinked.
    ///
    /// Each unlink is its own write. If any of them fails the profile is
    /// kept and `PartialCascadeFailure` lists which jobs are still linked;
    /// jobs already unlinked stay unlinked.
    pub fn delete_profile(&self, profile_id: i64) -> StoreResult<Vec<i64>> {
        self.fetch_existing::<Profile>(PROFILES, profile_id)?;
        let unlinked = self.unlink_profile(profile_id)?;
        self.remove_profile_record(profile_id)?;
        info!(
            "deleted profile #{} after unlinking {} job(s)",
            profile_id,
            unlinked.len()
        );
        Ok(unlinked)
    }

    fn unlink_profile(&self, profile_id: i64) -> StoreResult<Vec<i64>> {
        let dependents = self.jobs_for_profile(profile_id)?;
        let mut unlinked = Vec::with_capacity(dependents.len());
        let mut still_linked = Vec::new();

        for mut job in dependents {
            let Some(job_id) = job.id else { continue };
            job.profile_id = None;
            job.clear_match();
            match self.update_job(&job) {
                Ok(()) => unlinked.push(job_id),
                Err(e) => {
                    warn!(
                        "could not unlink job #{} from profile #{}: {}",
                        job_id, profile_id, e
                    );
                    still_linked.push(job_id);
                }
            }
        }

        if still_linked.is_empty() {
            Ok(unlinked)
        } else {
            Err(StoreError::PartialCascadeFailure {
                profile_id,
                unlinked,
                still_linked,
            })
        }
    }

    /// Renames a company. Jobs hold the id, so only the company record and
    /// the name cache change.
    pub fn rename_company(
        &self,
        company_id: i64,
        name: &str,
        names: &mut CompanyNames,
    ) -> StoreResult<()> {
        let mut company: Company = self.fetch_existing(COMPANIES, company_id)?;
        company.name = name.to_string();
        self.update_company(&company)?;
        names.register(company_id, name.trim());
        Ok(())
    }

    /// Deletes a company without touching its jobs. Returns how many jobs
    /// now point at a company that no longer exists.
    pub fn remove_company(&self, company_id: i64, names: &mut CompanyNames) -> StoreResult<usize> {
        self.delete_company(company_id)?;
        names.forget(company_id);
        let orphaned = self
            .kv()
            .count_index(JOBS, "company_id", &KeyRange::only(company_id))?;
        if orphaned > 0 {
            info!(
                "deleted company #{}; {} job(s) keep the dangling company_id",
                company_id, orphaned
            );
        }
        Ok(orphaned)
    }

    /// Creates a job, first creating its company when `company_name` names
    /// one that does not exist yet. A job that fails validation creates no
    /// company. New companies land in `names` once the job is stored.
    pub fn save_job_with_company(
        &self,
        job: &Job,
        company_name: Option<&str>,
        names: &mut CompanyNames,
    ) -> StoreResult<i64> {
        let mut job = job.clone();
        self.validate_job(&mut job)?;
        let Some(name) = non_blank(company_name) else {
            return self.create_job(&job);
        };

        let (company_id, job_id) = self.kv().batch(|_| {
            let (company_id, created) = self.find_or_create_company(name)?;
            if created {
                info!("created company '{}' (#{}) for new job", name, company_id);
            }
            job.company_id = Some(company_id);
            Ok((company_id, self.create_job(&job)?))
        })?;
        names.register(company_id, name);
        Ok(job_id)
    }
}
