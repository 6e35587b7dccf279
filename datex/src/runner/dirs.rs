//! Home and work directory resolution.
//!
//! Jobs are usually launched one of two ways: from a scheduler with an
//! absolute path to a configuration file, or from inside a project directory
//! holding the configuration. Either way the job's artifacts should stay
//! next to its configuration, so the configuration file's directory is the
//! preferred default for both the home and the work directory.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::context::{SYM_HOME_DIR, SYM_JOB_DIR, SYM_WORK_DIR};
use crate::engine::EngineBuilder;

/// Resolved home and work directories for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDirectories {
    home: PathBuf,
    work: PathBuf,
}

impl JobDirectories {
    /// Resolves directories from explicit settings and the configuration
    /// file location.
    ///
    /// Home is the first usable of: the explicit setting (ignored when blank
    /// or `.`), the configuration file's directory, the current working
    /// directory. Work follows the same chain but falls back to home, and an
    /// explicit work directory is created when missing.
    #[must_use]
    pub fn resolve(
        home: Option<&Path>,
        work: Option<&Path>,
        config_file: Option<&Path>,
    ) -> Self {
        let config_dir = config_file.and_then(|file| {
            if file.exists() {
                file.parent().map(normalize)
            } else {
                None
            }
        });

        let home = home
            .filter(|p| !p.as_os_str().is_empty() && *p != Path::new("."))
            .map(normalize)
            .or_else(|| config_dir.clone())
            .unwrap_or_else(working_dir);

        let work = work
            .and_then(usable_work_dir)
            .or(config_dir)
            .unwrap_or_else(|| home.clone());

        Self { home, work }
    }

    /// The home directory: where the job's configuration and fixed artifacts
    /// live.
    #[must_use]
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// The work directory: where the job writes its output and scratch
    /// files.
    #[must_use]
    pub fn work(&self) -> &Path {
        &self.work
    }

    /// The per-job directory under work, named after the job.
    #[must_use]
    pub fn job_dir(&self, job: &str) -> PathBuf {
        self.work.join(job)
    }

    /// Seeds the directory symbols onto an engine builder.
    #[must_use]
    pub fn seed(&self, builder: EngineBuilder, job: &str) -> EngineBuilder {
        builder
            .symbol(SYM_HOME_DIR, self.home.display().to_string())
            .symbol(SYM_WORK_DIR, self.work.display().to_string())
            .symbol(SYM_JOB_DIR, self.job_dir(job).display().to_string())
    }
}

impl Default for JobDirectories {
    fn default() -> Self {
        Self::resolve(None, None, None)
    }
}

fn working_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn normalize(path: &Path) -> PathBuf {
    if path.as_os_str().is_empty() {
        return working_dir();
    }
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn usable_work_dir(path: &Path) -> Option<PathBuf> {
    if path.as_os_str().is_empty() {
        return None;
    }
    if !path.exists() {
        if let Err(e) = fs::create_dir_all(path) {
            warn!(path = %path.display(), "cannot create work directory: {e}");
            return None;
        }
    }
    if path.is_dir() {
        Some(normalize(path))
    } else {
        warn!(path = %path.display(), "work setting is not a directory");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_explicit_directories_win() {
        let home = tempdir().unwrap();
        let work = tempdir().unwrap();
        let cfg = tempdir().unwrap();
        let cfg_file = cfg.path().join("job.json");
        std::fs::write(&cfg_file, "{}").unwrap();

        let dirs = JobDirectories::resolve(
            Some(home.path()),
            Some(work.path()),
            Some(&cfg_file),
        );

        assert_eq!(dirs.home(), home.path().canonicalize().unwrap());
        assert_eq!(dirs.work(), work.path().canonicalize().unwrap());
    }

    #[test]
    fn test_configuration_directory_is_the_default() {
        let cfg = tempdir().unwrap();
        let cfg_file = cfg.path().join("job.json");
        std::fs::write(&cfg_file, "{}").unwrap();

        let dirs = JobDirectories::resolve(None, None, Some(&cfg_file));

        let expected = cfg.path().canonicalize().unwrap();
        assert_eq!(dirs.home(), expected);
        assert_eq!(dirs.work(), expected);
    }

    #[test]
    fn test_missing_configuration_file_falls_back_to_cwd() {
        let dirs = JobDirectories::resolve(None, None, Some(Path::new("no/such/file.json")));

        let cwd = std::env::current_dir().unwrap();
        assert_eq!(dirs.home(), cwd);
        assert_eq!(dirs.work(), cwd);
    }

    #[test]
    fn test_dot_home_is_treated_as_unset() {
        let dirs = JobDirectories::resolve(Some(Path::new(".")), None, None);
        assert_eq!(dirs.home(), std::env::current_dir().unwrap());
    }

    #[test]
    fn test_explicit_work_directory_is_created() {
        let base = tempdir().unwrap();
        let work = base.path().join("out").join("scratch");
        assert!(!work.exists());

        let dirs = JobDirectories::resolve(None, Some(&work), None);

        assert!(work.is_dir());
        assert_eq!(dirs.work(), work.canonicalize().unwrap());
    }

    #[test]
    fn test_work_falls_back_to_home() {
        let home = tempdir().unwrap();
        let dirs = JobDirectories::resolve(Some(home.path()), None, None);
        assert_eq!(dirs.work(), dirs.home());
    }

    #[test]
    fn test_job_dir_is_under_work() {
        let work = tempdir().unwrap();
        let dirs = JobDirectories::resolve(None, Some(work.path()), None);
        assert_eq!(dirs.job_dir("nightly"), dirs.work().join("nightly"));
    }
}
