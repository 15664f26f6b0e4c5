//! Default installation paths for SteamCMD and workshop content.
//!
//! Layout under an installation root:
//!
//! - `{root}/steamcmd/steamcmd.sh` (`steamcmd.exe` on Windows)
//! - `{root}/steamapps/workshop/content/{app_id}/{item_id}/`
//!
//! Default roots:
//!
//! - Windows: `C:/RimRust`
//! - macOS / Linux: `$HOME/RimRust`
//!
//! Everything here is a pure path computation; nothing touches the disk.

use std::path::{Path, PathBuf};

use super::types::HostOs;

/// Name of the application directory used for default roots.
const RIMRUST_DIR: &str = "RimRust";

/// Subdirectory of the root that holds the SteamCMD installation.
const STEAMCMD_DIR: &str = "steamcmd";

/// Windows drive root used for the default installation.
const WINDOWS_ROOT: &str = "C:/";

// ============================================================================
// Defaults by operating system
// ============================================================================

/// Returns the default installation root for an operating-system identifier.
///
/// Unrecognized identifiers yield `None` so callers can fall back to a
/// user-supplied directory.
pub fn default_root(os: &str) -> Option<PathBuf> {
    let os = HostOs::parse(os)?;
    default_root_for(os, dirs::home_dir().as_deref())
}

/// Returns the default SteamCMD executable path for an operating-system
/// identifier, or `None` if the identifier is unrecognized.
pub fn default_tool_path(os: &str) -> Option<PathBuf> {
    let os = HostOs::parse(os)?;
    default_tool_path_for(os, dirs::home_dir().as_deref())
}

/// Default installation root with the home directory supplied explicitly.
///
/// Returns `None` on Unix-like systems when no home directory is known.
pub fn default_root_for(os: HostOs, home: Option<&Path>) -> Option<PathBuf> {
    match os {
        HostOs::Windows => Some(Path::new(WINDOWS_ROOT).join(RIMRUST_DIR)),
        HostOs::MacOs | HostOs::Linux => home.map(|h| h.join(RIMRUST_DIR)),
    }
}

/// Default SteamCMD executable path with the home directory supplied explicitly.
pub fn default_tool_path_for(os: HostOs, home: Option<&Path>) -> Option<PathBuf> {
    default_root_for(os, home).map(|root| tool_binary_path(&root, os))
}

/// Default installation root for the host this binary runs on.
pub fn host_default_root() -> Option<PathBuf> {
    HostOs::current().and_then(|os| default_root(os.as_str()))
}

// ============================================================================
// Layout under a root
// ============================================================================

/// Returns the SteamCMD executable file name for an operating system.
pub fn tool_binary_name(os: HostOs) -> &'static str {
    match os {
        HostOs::Windows => "steamcmd.exe",
        HostOs::MacOs | HostOs::Linux => "steamcmd.sh",
    }
}

/// Returns the SteamCMD directory under an installation root.
///
/// Path: `{root}/steamcmd/`
pub fn tool_dir(root: &Path) -> PathBuf {
    root.join(STEAMCMD_DIR)
}

/// Returns the SteamCMD executable path under an installation root.
pub fn tool_binary_path(root: &Path, os: HostOs) -> PathBuf {
    tool_dir(root).join(tool_binary_name(os))
}

/// Returns the shared workshop content directory for an app.
///
/// Path: `{root}/steamapps/workshop/content/{app_id}/`
pub fn workshop_content_dir(root: &Path, app_id: u32) -> PathBuf {
    root.join("steamapps")
        .join("workshop")
        .join("content")
        .join(app_id.to_string())
}

/// Returns the directory a single workshop item is downloaded into.
pub fn item_dir(root: &Path, app_id: u32, item_id: &str) -> PathBuf {
    workshop_content_dir(root, app_id).join(item_id)
}
