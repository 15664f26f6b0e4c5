//! Download locations for the SteamCMD bootstrap packages.
//!
//! Valve publishes one small archive per operating system. It contains the
//! launcher script (or `.exe`), which updates itself on first run.

use super::types::{ArchiveFormat, HostOs};

/// A platform-specific download entry with optional SHA256 checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformDownload {
    /// The download URL.
    pub url: &'static str,
    /// Expected SHA256 hash (lowercase hex), or None to skip verification.
    ///
    /// Valve replaces the bootstrap archives in place without publishing
    /// digests, so the catalog ships without pins.
    pub sha256: Option<&'static str>,
}

impl PlatformDownload {
    pub const fn new(url: &'static str, sha256: Option<&'static str>) -> Self {
        Self { url, sha256 }
    }

    /// Archive format inferred from the URL.
    pub fn format(&self) -> Option<ArchiveFormat> {
        ArchiveFormat::from_url(self.url)
    }
}

const WINDOWS_DOWNLOAD: PlatformDownload = PlatformDownload::new(
    "https://steamcdn-a.akamaihd.net/client/installer/steamcmd.zip",
    None,
);

const MACOS_DOWNLOAD: PlatformDownload = PlatformDownload::new(
    "https://steamcdn-a.akamaihd.net/client/installer/steamcmd_osx.tar.gz",
    None,
);

const LINUX_DOWNLOAD: PlatformDownload = PlatformDownload::new(
    "https://steamcdn-a.akamaihd.net/client/installer/steamcmd_linux.tar.gz",
    None,
);

/// Returns the SteamCMD bootstrap download for an operating system.
pub fn steamcmd_download(os: HostOs) -> PlatformDownload {
    match os {
        HostOs::Windows => WINDOWS_DOWNLOAD,
        HostOs::MacOs => MACOS_DOWNLOAD,
        HostOs::Linux => LINUX_DOWNLOAD,
    }
}
