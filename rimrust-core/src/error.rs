//! Error types surfaced to front-end callers.
//!
//! Per-item download failures are never errors: they are reported inside an
//! [`InstallReport`](crate::scheduler::InstallReport). Only the conditions
//! below abort a call.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A batch-wide precondition does not hold.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("SteamCMD executable not found or not a file: {}", .0.display())]
    InvalidToolHandle(PathBuf),

    #[error("SteamCMD is not installed under {}", .0.display())]
    ToolNotInstalled(PathBuf),

    #[error("Installation root {} is not writable: {source}", path.display())]
    RootNotWritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No installation root given and no default exists for this platform")]
    NoInstallRoot,

    #[error("Concurrency limit must be at least 1")]
    InvalidConcurrency,
}

/// SteamCMD could not be acquired.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("No target directory given and no default exists for this platform")]
    NoTarget,

    #[error("SteamCMD is not available for {0}")]
    UnsupportedPlatform(String),

    #[error("Target directory {} is not writable: {source}", path.display())]
    TargetNotWritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to download SteamCMD: {0}")]
    Download(String),

    #[error("SteamCMD archive is corrupt: {0}")]
    CorruptArchive(String),

    #[error("SteamCMD failed verification at {}: {reason}", path.display())]
    VerificationFailed { path: PathBuf, reason: String },
}

/// A manifest file could not be loaded.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Cannot read manifest {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed manifest {} at line {line}, column {column}: {message}", path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("Invalid entry #{index} in manifest {}: {reason}", path.display())]
    InvalidEntry {
        path: PathBuf,
        index: usize,
        reason: String,
    },
}

/// Failure of an `install_mods` call as a whole.
#[derive(Debug, Error)]
pub enum InstallModsError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_writable_message_carries_os_error() {
        let err = AcquisitionError::TargetNotWritable {
            path: PathBuf::from("/readonly/steamcmd"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        let msg = err.to_string().to_lowercase();
        assert!(msg.contains("/readonly/steamcmd"));
        assert!(msg.contains("permission denied"));
    }

    #[test]
    fn test_manifest_errors_name_the_file_and_entry() {
        let err = ManifestError::InvalidEntry {
            path: PathBuf::from("mods.json"),
            index: 3,
            reason: "missing \"id\"".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("mods.json"));
        assert!(msg.contains("#3"));
    }

    #[test]
    fn test_install_mods_error_is_transparent() {
        let err: InstallModsError = ConfigurationError::InvalidConcurrency.into();
        assert_eq!(err.to_string(), "Concurrency limit must be at least 1");
        assert!(matches!(err, InstallModsError::Configuration(_)));
    }
}
