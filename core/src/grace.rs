use std::fs;
use std::fs::OpenOptions;
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::time::Duration;
use std::time::SystemTime;

use tracing::debug;

/// Timestamp marker that lets a successful authentication stand in for the
/// next ones within a time window. The file carries no content, only an
/// mtime; anyone who can write to its path already holds the privilege this
/// tool grants.
pub struct GraceSentinel {
    path: PathBuf,
    threshold: Duration,
}

impl GraceSentinel {
    pub fn new(path: PathBuf, threshold: Duration) -> Self {
        Self { path, threshold }
    }

    /// True when the last recorded authentication is younger than the
    /// threshold. A missing or unreadable sentinel means re-authenticate.
    pub fn is_fresh(&self, now: SystemTime) -> bool {
        let Ok(metadata) = fs::metadata(&self.path) else {
            return false;
        };
        let Ok(mtime) = metadata.modified() else {
            return false;
        };
        match now.duration_since(mtime) {
            Ok(age) => {
                let fresh = age < self.threshold;
                debug!(age_secs = age.as_secs(), fresh, "grace sentinel checked");
                fresh
            }
            // An mtime in the future can only come from clock adjustment;
            // treat it as a fresh authentication rather than re-prompting.
            Err(_) => true,
        }
    }

    /// Creates or truncates the sentinel, refreshing its mtime. Only ever
    /// called after a successful verification. Owner-write-only, zero
    /// length.
    pub fn record_success(&self) -> io::Result<()> {
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o200)
            .open(&self.path)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;
    use std::time::SystemTime;

    use pretty_assertions::assert_eq;

    use super::GraceSentinel;

    fn sentinel(dir: &tempfile::TempDir, threshold: Duration) -> GraceSentinel {
        GraceSentinel::new(dir.path().join("stamp"), threshold)
    }

    #[test]
    fn missing_sentinel_is_not_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let sentinel = sentinel(&dir, Duration::from_secs(60));
        assert!(!sentinel.is_fresh(SystemTime::now()));
    }

    #[test]
    fn recorded_success_is_fresh_within_the_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let sentinel = sentinel(&dir, Duration::from_secs(3600));
        sentinel.record_success().unwrap();
        assert!(sentinel.is_fresh(SystemTime::now()));
    }

    #[test]
    fn recorded_success_is_stale_past_the_threshold() {
        let dir = tempfile::tempdir().unwrap();
        // Zero threshold: any age at all is stale.
        let sentinel = sentinel(&dir, Duration::ZERO);
        sentinel.record_success().unwrap();
        assert!(!sentinel.is_fresh(SystemTime::now() + Duration::from_secs(1)));
    }

    #[test]
    fn sentinel_is_zero_length_and_owner_write_only() {
        let dir = tempfile::tempdir().unwrap();
        let sentinel = sentinel(&dir, Duration::from_secs(60));
        sentinel.record_success().unwrap();
        let metadata = fs::metadata(dir.path().join("stamp")).unwrap();
        assert_eq!(metadata.len(), 0);
        assert_eq!(metadata.permissions().mode() & 0o777, 0o200);
    }

    #[test]
    fn record_success_refreshes_an_existing_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let sentinel = sentinel(&dir, Duration::from_secs(3600));
        sentinel.record_success().unwrap();
        let first = fs::metadata(dir.path().join("stamp")).unwrap().modified().unwrap();
        std::thread::sleep(Duration::from_millis(20));
        sentinel.record_success().unwrap();
        let second = fs::metadata(dir.path().join("stamp")).unwrap().modified().unwrap();
        assert!(second > first);
    }
}
