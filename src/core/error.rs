use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures that stop a scan before any file is read.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Cannot read log directory {}: {source}", path.display())]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Scan cancelled")]
    Cancelled,
}

/// Failures surfaced by one refresh invocation.
#[derive(Error, Debug)]
pub enum RefreshError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error("Refresh timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
    #[error("Refresh worker failed: {0}")]
    Worker(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_unreadable_names_the_path() {
        let err = ScanError::RootUnreadable {
            path: PathBuf::from("/var/logs/projects"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/var/logs/projects"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn timeout_message_in_seconds() {
        let err = RefreshError::TimedOut(Duration::from_secs(30));
        assert_eq!(err.to_string(), "Refresh timed out after 30s");
    }

    #[test]
    fn scan_error_is_transparent() {
        let scan = ScanError::RootUnreadable {
            path: PathBuf::from("/x"),
            source: std::io::Error::new(std::io::ErrorKind::Other, "boom"),
        };
        let expected = scan.to_string();
        let err: RefreshError = scan.into();
        assert_eq!(err.to_string(), expected);
    }
}
