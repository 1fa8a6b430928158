use std::path::{Path, PathBuf};

/// Environment variable that overrides the database location.
pub const DB_ENV: &str = "JOBTRACK_DB";

pub const DEFAULT_PAGE_SIZE: usize = 25;

const DB_FILE: &str = "jobtrack.db";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub page_size: usize,
}

impl Config {
    /// Resolves the database path: explicit flag, then `JOBTRACK_DB`, then
    /// the platform data directory, then the working directory.
    pub fn resolve(db_flag: Option<&Path>, page_size: Option<usize>) -> Self {
        let db_path = match db_flag {
            Some(path) => path.to_path_buf(),
            None => match std::env::var_os(DB_ENV) {
                Some(path) if !path.is_empty() => PathBuf::from(path),
                _ => default_path(),
            },
        };
        Self {
            db_path,
            page_size: page_size.filter(|size| *size > 0).unwrap_or(DEFAULT_PAGE_SIZE),
        }
    }
}

fn default_path() -> PathBuf {
    // Use XDG data directory or fallback
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "jobtrack") {
        proj_dirs.data_dir().join(DB_FILE)
    } else {
        PathBuf::from(DB_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_wins_over_everything() {
        let config = Config::resolve(Some(Path::new("/tmp/custom.db")), None);
        assert_eq!(config.db_path, PathBuf::from("/tmp/custom.db"));
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_zero_page_size_falls_back_to_default() {
        let config = Config::resolve(Some(Path::new("x.db")), Some(0));
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        let config = Config::resolve(Some(Path::new("x.db")), Some(10));
        assert_eq!(config.page_size, 10);
    }

    #[test]
    fn test_default_path_ends_with_db_file() {
        assert!(default_path().ends_with(DB_FILE));
    }
}
