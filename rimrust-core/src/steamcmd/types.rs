//! Core types for SteamCMD management.
//!
//! Host operating system identification, archive formats for the SteamCMD
//! bootstrap packages, and the [`ToolHandle`] handed to the scheduler.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

// ============================================================================
// Host Operating System
// ============================================================================

/// The closed set of operating systems SteamCMD ships for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostOs {
    Windows,
    MacOs,
    Linux,
}

impl HostOs {
    /// Returns all recognized operating systems.
    pub fn all() -> &'static [HostOs] {
        &[Self::Windows, Self::MacOs, Self::Linux]
    }

    /// Parses an operating-system identifier.
    ///
    /// Accepts the values of `std::env::consts::OS` plus a few common
    /// aliases. Returns `None` for anything unrecognized.
    pub fn parse(identifier: &str) -> Option<Self> {
        match identifier.trim().to_lowercase().as_str() {
            "windows" | "win" | "win32" => Some(Self::Windows),
            "macos" | "darwin" | "osx" | "mac" => Some(Self::MacOs),
            "linux" => Some(Self::Linux),
            _ => None,
        }
    }

    /// Detects the operating system this binary was built for.
    ///
    /// Returns `None` on hosts SteamCMD does not support.
    pub fn current() -> Option<Self> {
        Self::parse(std::env::consts::OS)
    }

    /// Returns the lowercase identifier understood by [`HostOs::parse`].
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Windows => "windows",
            Self::MacOs => "macos",
            Self::Linux => "linux",
        }
    }

    /// Returns a human-readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Windows => "Windows",
            Self::MacOs => "macOS",
            Self::Linux => "Linux",
        }
    }
}

impl fmt::Display for HostOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

// ============================================================================
// Archive Format
// ============================================================================

/// Archive format of a SteamCMD bootstrap package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveFormat {
    /// Gzip-compressed tar archive (.tar.gz, .tgz)
    TarGz,
    /// ZIP archive (.zip)
    Zip,
}

impl ArchiveFormat {
    /// Infers the archive format from a URL or filename.
    pub fn from_url(url: &str) -> Option<Self> {
        let lower = url.to_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if lower.ends_with(".zip") {
            Some(Self::Zip)
        } else {
            None
        }
    }
}

// ============================================================================
// Tool Handle
// ============================================================================

/// A resolved, verified SteamCMD executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolHandle {
    path: PathBuf,
    freshly_installed: bool,
}

impl ToolHandle {
    pub(crate) fn new(path: PathBuf, freshly_installed: bool) -> Self {
        Self {
            path,
            freshly_installed,
        }
    }

    /// Path to the SteamCMD executable.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory containing the executable.
    pub fn dir(&self) -> Option<&Path> {
        self.path.parent()
    }

    /// True if this handle was produced by a fresh download.
    pub fn freshly_installed(&self) -> bool {
        self.freshly_installed
    }
}

impl fmt::Display for ToolHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}
