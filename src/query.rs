//! Status-filtered, sorted, paginated job listing.
//!
//! The engine only offers single-index ordered cursors, so
//! `WHERE status = ? ORDER BY <field> LIMIT ? OFFSET ?` is emulated by
//! walking the sort field's index and filtering on the fly. Sorting by
//! status walks only the requested key range; every other sort field visits
//! non-matching jobs too, so the cost is proportional to the number of jobs
//! sitting before the end of the requested page in sort order, and a late
//! page of a rare status can scan the whole store.

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::db::{decode, Database};
use crate::error::StoreResult;
use crate::kv::{KeyRange, ScanDirection};
use crate::models::{Job, JobStatus};
use crate::schema::JOBS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Title,
    /// Orders by `company_id`, i.e. by when the company was created, not
    /// alphabetically by name.
    Company,
    Location,
    Salary,
    MatchPercentage,
    Status,
    CreatedAt,
}

impl SortField {
    /// The jobs index that provides this ordering.
    pub fn index(&self) -> &'static str {
        match self {
            SortField::Title => "title",
            SortField::Company => "company_id",
            SortField::Location => "location",
            SortField::Salary => "salary",
            SortField::MatchPercentage => "match_percentage",
            SortField::Status => "status",
            SortField::CreatedAt => "created_at",
        }
    }
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "title" => Ok(SortField::Title),
            "company" | "company_id" | "company_name" => Ok(SortField::Company),
            "location" => Ok(SortField::Location),
            "salary" => Ok(SortField::Salary),
            "match" | "match_percentage" => Ok(SortField::MatchPercentage),
            "status" => Ok(SortField::Status),
            "created" | "created_at" => Ok(SortField::CreatedAt),
            _ => Err(format!(
                "Unknown sort field '{}'. Available: title, company, location, salary, \
                 match_percentage, status, created_at",
                s
            )),
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.index())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ASC" => Ok(SortDirection::Asc),
            "DESC" => Ok(SortDirection::Desc),
            _ => Err(format!("Unknown sort direction '{}'. Use ASC or DESC", s)),
        }
    }
}

impl From<SortDirection> for ScanDirection {
    fn from(direction: SortDirection) -> Self {
        match direction {
            SortDirection::Asc => ScanDirection::Ascending,
            SortDirection::Desc => ScanDirection::Descending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    pub fn newest_first() -> Self {
        Self::new(SortField::CreatedAt, SortDirection::Desc)
    }
}

impl Default for SortSpec {
    fn default() -> Self {
        Self::newest_first()
    }
}

/// Parses `"<field>"` or `"<field> <ASC|DESC>"`; the direction defaults to ASC.
impl FromStr for SortSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let field: SortField = parts
            .next()
            .ok_or_else(|| "Empty sort specification".to_string())?
            .parse()?;
        let direction = match parts.next() {
            Some(dir) => dir.parse()?,
            None => SortDirection::Asc,
        };
        if parts.next().is_some() {
            return Err(format!("Unexpected text in sort specification '{}'", s));
        }
        Ok(Self::new(field, direction))
    }
}

/// A page of jobs plus what a pager needs to render around it.
#[derive(Debug, Clone, PartialEq)]
pub struct JobPage {
    pub jobs: Vec<Job>,
    /// The page actually returned, after clamping.
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub total_pages: usize,
}

/// Pages needed for `total` items; an empty listing still has one page.
pub fn total_pages(total: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 1;
    }
    total.div_ceil(page_size).max(1)
}

impl Database {
    /// Jobs with `status`, ordered by `sort`, page `page` (1-based) of
    /// `page_size`. Page 0 reads as page 1; a page past the end is empty.
    pub fn get_page(
        &self,
        status: JobStatus,
        sort: SortSpec,
        page: usize,
        page_size: usize,
    ) -> StoreResult<Vec<Job>> {
        if page_size == 0 {
            return Ok(Vec::new());
        }
        let page = page.max(1);
        let Some(mut to_skip) = (page - 1).checked_mul(page_size) else {
            return Ok(Vec::new());
        };

        let range = if sort.field == SortField::Status {
            KeyRange::only(status.as_str())
        } else {
            KeyRange::all()
        };
        let mut cursor =
            self.kv()
                .index_cursor(JOBS, sort.field.index(), range, sort.direction.into())?;

        let mut jobs = Vec::with_capacity(page_size);
        while jobs.len() < page_size {
            let Some(record) = cursor.next() else { break };
            let job: Job = decode(JOBS, record?)?;
            if job.status != status {
                continue;
            }
            if to_skip > 0 {
                to_skip -= 1;
                continue;
            }
            jobs.push(job);
        }

        debug!(
            "get_page({}, {} {:?}, page {}, size {}) visited {} index entries for {} jobs",
            status,
            sort.field,
            sort.direction,
            page,
            page_size,
            cursor.visited(),
            jobs.len()
        );
        Ok(jobs)
    }

    /// Number of jobs with `status`; agrees with what [`Database::get_page`]
    /// can return for the same status.
    pub fn count_jobs(&self, status: JobStatus) -> StoreResult<usize> {
        self.kv()
            .count_index(JOBS, "status", &KeyRange::only(status.as_str()))
    }

    /// Like [`Database::get_page`], but first clamps `page` into
    /// `1..=total_pages` so a stale page number still shows the last page.
    pub fn job_page(
        &self,
        status: JobStatus,
        sort: SortSpec,
        page: usize,
        page_size: usize,
    ) -> StoreResult<JobPage> {
        let total = self.count_jobs(status)?;
        let total_pages = total_pages(total, page_size);
        let page = page.clamp(1, total_pages);
        let jobs = self.get_page(status, sort, page, page_size)?;
        Ok(JobPage {
            jobs,
            page,
            page_size,
            total,
            total_pages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Company, Profile};
    use std::collections::HashSet;

    const ALL_FIELDS: [SortField; 7] = [
        SortField::Title,
        SortField::Company,
        SortField::Location,
        SortField::Salary,
        SortField::MatchPercentage,
        SortField::Status,
        SortField::CreatedAt,
    ];

    /// 23 jobs spread over three statuses with varied (and sometimes missing)
    /// sort fields. Timestamps are spaced out explicitly so ordering does not
    /// depend on the clock.
    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        let acme = db.create_company(&Company::named("Acme")).unwrap();
        let globex = db.create_company(&Company::named("Globex")).unwrap();
        let profile = db.create_profile(&Profile::new("A", "resume")).unwrap();

        let statuses = [JobStatus::Bookmarked, JobStatus::Applied, JobStatus::Rejected];
        for i in 0..23 {
            let mut job = Job::new(format!("Job {:02}", (i * 7) % 23));
            job.status = statuses[i % 3];
            job.company_id = match i % 4 {
                0 => None,
                1 | 2 => Some(acme),
                _ => Some(globex),
            };
            job.location = (i % 5 != 0).then(|| ["Berlin", "Remote", "Oslo"][i % 3].to_string());
            job.salary = (i % 6 != 0).then(|| (50 + (i * 13) % 40) as f64 * 1000.0);
            if i % 2 == 0 {
                job.profile_id = Some(profile);
                job.match_percentage = Some(((i * 17) % 101) as u8);
                job.match_justification = Some("auto".into());
            }
            job.created_at = format!("2024-03-{:02}T10:00:00.000Z", 1 + (i * 5) % 23);
            db.create_job(&job).unwrap();
        }
        db
    }

    fn ids(jobs: &[Job]) -> Vec<i64> {
        jobs.iter().filter_map(|j| j.id).collect()
    }

    #[test]
    fn test_pages_cover_every_matching_job_once() {
        let db = seeded();
        for status in [JobStatus::Bookmarked, JobStatus::Applied, JobStatus::Rejected] {
            let expected: HashSet<i64> = db
                .list_jobs()
                .unwrap()
                .into_iter()
                .filter(|j| j.status == status)
                .filter_map(|j| j.id)
                .collect();
            let count = db.count_jobs(status).unwrap();
            assert_eq!(count, expected.len());

            for field in ALL_FIELDS {
                for direction in [SortDirection::Asc, SortDirection::Desc] {
                    for page_size in [1, 3, 4, 10] {
                        let sort = SortSpec::new(field, direction);
                        let mut seen = Vec::new();
                        for page in 1..=total_pages(count, page_size) {
                            let jobs = db.get_page(status, sort, page, page_size).unwrap();
                            assert!(jobs.len() <= page_size);
                            assert!(jobs.iter().all(|j| j.status == status));
                            seen.extend(ids(&jobs));
                        }
                        let unique: HashSet<i64> = seen.iter().copied().collect();
                        assert_eq!(seen.len(), unique.len(), "duplicates for {:?}", sort);
                        assert_eq!(unique, expected, "mismatch for {:?} size {}", sort, page_size);
                    }
                }
            }
        }
    }

    #[test]
    fn test_created_at_desc_is_monotonic_across_pages() {
        let db = seeded();
        let sort = SortSpec::newest_first();
        let status = JobStatus::Bookmarked;
        let pages: Vec<Vec<Job>> = (1..=3)
            .map(|page| db.get_page(status, sort, page, 3).unwrap())
            .collect();
        for window in pages.windows(2) {
            let (prev, next) = (&window[0], &window[1]);
            if let (Some(last), Some(first)) = (prev.last(), next.first()) {
                assert!(last.created_at >= first.created_at);
            }
        }
        let flat: Vec<&Job> = pages.iter().flatten().collect();
        assert!(flat.windows(2).all(|w| w[0].created_at >= w[1].created_at));
    }

    #[test]
    fn test_salary_sort_orders_missing_values_first() {
        let db = seeded();
        let jobs = db
            .get_page(
                JobStatus::Bookmarked,
                SortSpec::new(SortField::Salary, SortDirection::Asc),
                1,
                100,
            )
            .unwrap();
        let salaries: Vec<Option<f64>> = jobs.iter().map(|j| j.salary).collect();
        let first_some = salaries.iter().position(Option::is_some).unwrap();
        assert!(salaries[..first_some].iter().all(Option::is_none));
        let present: Vec<f64> = salaries.iter().flatten().copied().collect();
        assert!(present.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_company_sort_uses_company_id_not_name() {
        let db = Database::open_in_memory().unwrap();
        let zeta = db.create_company(&Company::named("Zeta")).unwrap();
        let alpha = db.create_company(&Company::named("Alpha")).unwrap();
        for company in [alpha, zeta] {
            let mut job = Job::new("Engineer");
            job.company_id = Some(company);
            db.create_job(&job).unwrap();
        }
        let jobs = db
            .get_page(
                JobStatus::Bookmarked,
                SortSpec::new(SortField::Company, SortDirection::Asc),
                1,
                10,
            )
            .unwrap();
        let order: Vec<Option<i64>> = jobs.iter().map(|j| j.company_id).collect();
        assert_eq!(order, vec![Some(zeta), Some(alpha)]);
    }

    #[test]
    fn test_page_past_the_end_is_empty() {
        let db = seeded();
        let jobs = db
            .get_page(JobStatus::Applied, SortSpec::default(), 50, 5)
            .unwrap();
        assert!(jobs.is_empty());
        assert!(db
            .get_page(JobStatus::Applied, SortSpec::default(), 1, 0)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_huge_page_number_is_empty() {
        let db = seeded();
        assert!(db
            .get_page(JobStatus::Applied, SortSpec::newest_first(), usize::MAX, 2)
            .unwrap()
            .is_empty());
        assert!(db
            .get_page(JobStatus::Applied, SortSpec::default(), usize::MAX / 2, 3)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_page_zero_reads_as_first_page() {
        let db = seeded();
        let sort = SortSpec::new(SortField::Title, SortDirection::Asc);
        assert_eq!(
            db.get_page(JobStatus::Applied, sort, 0, 4).unwrap(),
            db.get_page(JobStatus::Applied, sort, 1, 4).unwrap()
        );
    }

    #[test]
    fn test_job_page_clamps_to_last_page() {
        let db = seeded();
        let total = db.count_jobs(JobStatus::Rejected).unwrap();
        let page = db
            .job_page(JobStatus::Rejected, SortSpec::default(), 99, 3)
            .unwrap();
        assert_eq!(page.total, total);
        assert_eq!(page.total_pages, total_pages(total, 3));
        assert_eq!(page.page, page.total_pages);
        assert!(!page.jobs.is_empty());

        let empty = db
            .job_page(JobStatus::Spam, SortSpec::default(), 4, 3)
            .unwrap();
        assert_eq!((empty.page, empty.total, empty.total_pages), (1, 0, 1));
        assert!(empty.jobs.is_empty());
    }

    #[test]
    fn test_status_sort_only_visits_matching_range() {
        let db = seeded();
        let sort = SortSpec::new(SortField::Status, SortDirection::Asc);
        let jobs = db.get_page(JobStatus::Applied, sort, 1, 100).unwrap();
        assert_eq!(jobs.len(), db.count_jobs(JobStatus::Applied).unwrap());
        // Equal keys come back in creation order.
        let order = ids(&jobs);
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(order, sorted);
    }

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(0, 10), 1);
        assert_eq!(total_pages(10, 10), 1);
        assert_eq!(total_pages(11, 10), 2);
        assert_eq!(total_pages(5, 0), 1);
    }

    #[test]
    fn test_sort_spec_parsing() {
        assert_eq!(
            "created_at DESC".parse::<SortSpec>().unwrap(),
            SortSpec::newest_first()
        );
        assert_eq!(
            "company".parse::<SortSpec>().unwrap(),
            SortSpec::new(SortField::Company, SortDirection::Asc)
        );
        assert_eq!(
            "salary desc".parse::<SortSpec>().unwrap().direction,
            SortDirection::Desc
        );
        assert!("salary sideways".parse::<SortSpec>().is_err());
        assert!("color".parse::<SortSpec>().is_err());
        assert!("".parse::<SortSpec>().is_err());
    }
}
