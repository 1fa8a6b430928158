use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Shown wherever a job's `company_id` does not resolve.
pub const UNKNOWN_COMPANY: &str = "Unknown Company";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Company {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub linkedin: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Company {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// A resume the jobs can be matched against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub notes: Option<String>,
    /// Set once at creation.
    #[serde(default)]
    pub created_at: String,
}

impl Profile {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            ..Default::default()
        }
    }
}

/// A contact. `company_name` is free text, not a reference to a company.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Person {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub linkedin: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Person {
    pub fn full_name(&self) -> String {
        [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    #[default]
    Bookmarked,
    Applying,
    Applied,
    Interviewing,
    Negotiating,
    Accepted,
    Spam,
    Rejected,
}

impl JobStatus {
    /// Board column order.
    pub const ALL: [JobStatus; 8] = [
        JobStatus::Bookmarked,
        JobStatus::Applying,
        JobStatus::Applied,
        JobStatus::Interviewing,
        JobStatus::Negotiating,
        JobStatus::Accepted,
        JobStatus::Spam,
        JobStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Bookmarked => "Bookmarked",
            JobStatus::Applying => "Applying",
            JobStatus::Applied => "Applied",
            JobStatus::Interviewing => "Interviewing",
            JobStatus::Negotiating => "Negotiating",
            JobStatus::Accepted => "Accepted",
            JobStatus::Spam => "Spam",
            JobStatus::Rejected => "Rejected",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!(
                    "Unknown status '{}'. Expected one of: {}",
                    s,
                    JobStatus::ALL.map(|status| status.as_str()).join(", ")
                )
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Job {
    #[serde(default)]
    pub id: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub company_id: Option<i64>,
    #[serde(default)]
    pub location: Option<String>,
    /// Whole amounts serialize as JSON integers.
    #[serde(default, serialize_with = "serialize_salary")]
    pub salary: Option<f64>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: JobStatus,
    /// Set once at creation.
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub profile_id: Option<i64>,
    /// 0-100; set together with `match_justification`.
    #[serde(default)]
    pub match_percentage: Option<u8>,
    #[serde(default)]
    pub match_justification: Option<String>,
    /// Serialized [`CategorizedKeywords`].
    #[serde(default)]
    pub ai_keywords: Option<String>,
}

// Beyond 2^53 an f64 no longer holds every integer exactly.
const EXACT_INTEGER_LIMIT: f64 = 9_007_199_254_740_992.0;

fn serialize_salary<S: Serializer>(salary: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    match salary {
        Some(amount) if amount.fract() == 0.0 && amount.abs() <= EXACT_INTEGER_LIMIT => {
            serializer.serialize_some(&(*amount as i64))
        }
        Some(amount) => serializer.serialize_some(amount),
        None => serializer.serialize_none(),
    }
}

impl Job {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn clear_match(&mut self) {
        self.match_percentage = None;
        self.match_justification = None;
    }
}

/// Keywords extracted from a posting, split by how strongly they are asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorizedKeywords {
    #[serde(default)]
    pub mandatory: Vec<String>,
    #[serde(default)]
    pub nice_to_have: Vec<String>,
}

impl CategorizedKeywords {
    pub fn is_empty(&self) -> bool {
        self.mandatory.is_empty() && self.nice_to_have.is_empty()
    }
}
