//! SteamCMD acquisition: detection, download, extraction and verification.
//!
//! The `ToolAcquirer` is the entry point for getting a working SteamCMD. It
//! coordinates the catalog, downloader and extractor, and never trusts file
//! presence alone: a binary only counts once it survives a `+quit` run.

use std::io;
use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, info, warn};

use super::catalog;
use super::downloader::{download_file, DownloadProgress};
use super::extractor::{extract_archive, make_executable};
use super::paths;
use super::process::{run_supervised, ProcessLimits, RunOutcome};
use super::types::{HostOs, ToolHandle};
use crate::cancel::CancelToken;
use crate::config::InstallerSettings;
use crate::error::AcquisitionError;

/// File the bootstrap archive is downloaded to, inside the target directory.
const ARCHIVE_FILE: &str = ".steamcmd-download";

/// Directory the archive is extracted into before moving into place.
const STAGING_DIR: &str = ".steamcmd-staging";

/// Probe file used to check that a directory is writable.
const WRITE_PROBE_FILE: &str = ".rimrust-write-probe";

/// Exit code SteamCMD uses after applying a self-update.
const SELF_UPDATE_EXIT_CODE: i32 = 7;

/// Name of SteamCMD when installed system-wide.
const SYSTEM_BINARY_NAME: &str = "steamcmd";

// ============================================================================
// Tool Acquirer
// ============================================================================

/// Finds, installs and verifies SteamCMD.
#[derive(Debug, Clone)]
pub struct ToolAcquirer {
    /// Host operating system, `None` if SteamCMD has no build for it.
    os: Option<HostOs>,
    /// Limits for the `+quit` verification run.
    verify_limits: ProcessLimits,
    /// Whether a `steamcmd` on PATH may satisfy `is_installed`.
    search_system_path: bool,
}

impl ToolAcquirer {
    pub fn new(settings: &InstallerSettings) -> Self {
        Self {
            os: HostOs::current(),
            verify_limits: settings.verify_limits(),
            search_system_path: settings.search_system_path,
        }
    }

    /// Overrides the detected operating system.
    pub fn with_os(mut self, os: Option<HostOs>) -> Self {
        self.os = os;
        self
    }

    /// Returns the operating system this acquirer installs for.
    pub fn os(&self) -> Option<HostOs> {
        self.os
    }

    // ========================================================================
    // Detection
    // ========================================================================

    /// Returns a handle to a working SteamCMD under `root`, if there is one.
    ///
    /// Missing or broken installations yield `None`; this never fails.
    pub async fn is_installed(&self, root: &Path) -> Option<ToolHandle> {
        if let Some(handle) = self.find_in_dir(&paths::tool_dir(root)).await {
            return Some(handle);
        }

        if self.search_system_path {
            return self.find_on_path().await;
        }

        None
    }

    /// Returns a handle to a working SteamCMD directly inside `tool_dir`.
    pub async fn find_in_dir(&self, tool_dir: &Path) -> Option<ToolHandle> {
        let os = self.os?;
        let binary = tool_dir.join(paths::tool_binary_name(os));

        if !binary.is_file() {
            debug!("No SteamCMD at {}", binary.display());
            return None;
        }

        match self.verify(&binary).await {
            Ok(()) => Some(ToolHandle::new(binary, false)),
            Err(reason) => {
                warn!(path = %binary.display(), %reason, "SteamCMD present but not functional");
                None
            }
        }
    }

    async fn find_on_path(&self) -> Option<ToolHandle> {
        let binary = which::which(SYSTEM_BINARY_NAME).ok()?;
        debug!("Found {} on PATH at {}", SYSTEM_BINARY_NAME, binary.display());

        match self.verify(&binary).await {
            Ok(()) => Some(ToolHandle::new(binary, false)),
            Err(reason) => {
                warn!(path = %binary.display(), %reason, "SteamCMD on PATH is not functional");
                None
            }
        }
    }

    /// Runs `<binary> +quit` and checks that it exits cleanly.
    async fn verify(&self, binary: &Path) -> Result<(), String> {
        let mut cmd = Command::new(binary);
        cmd.arg("+quit");
        if let Some(dir) = binary.parent() {
            cmd.current_dir(dir);
        }

        let outcome = run_supervised(cmd, self.verify_limits, &CancelToken::new())
            .await
            .map_err(|e| format!("failed to execute: {}", e))?;

        match outcome {
            RunOutcome::Exited { code: Some(0), .. } => Ok(()),
            RunOutcome::Exited {
                code: Some(SELF_UPDATE_EXIT_CODE),
                ..
            } => {
                debug!("SteamCMD applied a self-update during verification");
                Ok(())
            }
            RunOutcome::Exited { code, .. } => Err(match code {
                Some(code) => format!("exited with code {}", code),
                None => "terminated by a signal".to_string(),
            }),
            RunOutcome::TimedOut { .. } => Err(format!(
                "did not exit within {}s",
                self.verify_limits.timeout.as_secs()
            )),
            RunOutcome::Cancelled { .. } => Err("verification was cancelled".to_string()),
        }
    }

    // ========================================================================
    // Installation
    // ========================================================================

    /// Picks the directory SteamCMD is installed into.
    ///
    /// `custom_dir` is used verbatim; otherwise `{install_dir}/steamcmd`;
    /// otherwise the platform default.
    pub fn resolve_target(
        &self,
        custom_dir: Option<&Path>,
        install_dir: Option<&Path>,
    ) -> Result<PathBuf, AcquisitionError> {
        if let Some(dir) = custom_dir.filter(|d| !d.as_os_str().is_empty()) {
            return Ok(dir.to_path_buf());
        }
        if let Some(root) = install_dir.filter(|d| !d.as_os_str().is_empty()) {
            return Ok(paths::tool_dir(root));
        }

        let os = self.os.ok_or(AcquisitionError::NoTarget)?;
        paths::default_root(os.as_str())
            .map(|root| paths::tool_dir(&root))
            .ok_or(AcquisitionError::NoTarget)
    }

    /// Ensures a working SteamCMD exists in the target directory.
    ///
    /// Does nothing but verify when SteamCMD is already there. Otherwise
    /// downloads, extracts and verifies it, removing everything it wrote if
    /// any step fails.
    pub async fn install<F>(
        &self,
        custom_dir: Option<&Path>,
        install_dir: Option<&Path>,
        progress_cb: F,
    ) -> Result<ToolHandle, AcquisitionError>
    where
        F: Fn(DownloadProgress) + Send + Sync,
    {
        let os = self.os.ok_or_else(|| {
            AcquisitionError::UnsupportedPlatform(std::env::consts::OS.to_string())
        })?;
        let target = self.resolve_target(custom_dir, install_dir)?;

        if let Some(handle) = self.find_in_dir(&target).await {
            info!("SteamCMD already installed at {}", handle.path().display());
            return Ok(handle);
        }

        info!("Installing SteamCMD for {} into {}", os, target.display());

        let created = prepare_target(&target)?;
        let binary = target.join(paths::tool_binary_name(os));

        let mut moved = Vec::new();
        let result = self
            .download_into(os, &target, &binary, &mut moved, progress_cb)
            .await;

        remove_quietly(&target.join(ARCHIVE_FILE)).await;
        remove_quietly(&target.join(STAGING_DIR)).await;

        match result {
            Ok(()) => {
                info!("SteamCMD installed at {}", binary.display());
                Ok(ToolHandle::new(binary, true))
            }
            Err(e) => {
                warn!("SteamCMD installation failed: {}", e);
                match created {
                    Some(dir) => remove_quietly(&dir).await,
                    None => {
                        for path in moved.iter().rev() {
                            remove_quietly(path).await;
                        }
                    }
                }
                Err(e)
            }
        }
    }

    async fn download_into<F>(
        &self,
        os: HostOs,
        target: &Path,
        binary: &Path,
        moved: &mut Vec<PathBuf>,
        progress_cb: F,
    ) -> Result<(), AcquisitionError>
    where
        F: Fn(DownloadProgress) + Send + Sync,
    {
        let download = catalog::steamcmd_download(os);
        let format = download.format().ok_or_else(|| {
            AcquisitionError::Download(format!("unknown archive format for {}", download.url))
        })?;

        let archive = target.join(ARCHIVE_FILE);
        let staging = target.join(STAGING_DIR);

        download_file(download.url, &archive, download.sha256, progress_cb)
            .await
            .map_err(|e| AcquisitionError::Download(format!("{:#}", e)))?;

        remove_quietly(&staging).await;
        let (archive_path, staging_path) = (archive.clone(), staging.clone());
        tokio::task::spawn_blocking(move || extract_archive(&archive_path, &staging_path, format))
            .await
            .map_err(|e| {
                AcquisitionError::CorruptArchive(format!("extraction task failed: {}", e))
            })?
            .map_err(|e| AcquisitionError::CorruptArchive(format!("{:#}", e)))?;

        move_contents(&staging, target, moved)
            .await
            .map_err(|e| AcquisitionError::TargetNotWritable {
                path: target.to_path_buf(),
                source: e,
            })?;

        if !binary.is_file() {
            return Err(AcquisitionError::VerificationFailed {
                path: binary.to_path_buf(),
                reason: "archive did not contain the SteamCMD executable".to_string(),
            });
        }

        make_executable(binary).map_err(|e| AcquisitionError::VerificationFailed {
            path: binary.to_path_buf(),
            reason: format!("{:#}", e),
        })?;

        self.verify(binary)
            .await
            .map_err(|reason| AcquisitionError::VerificationFailed {
                path: binary.to_path_buf(),
                reason,
            })
    }
}

// ============================================================================
// Filesystem helpers
// ============================================================================

/// Creates `target` if needed and checks it is writable.
///
/// Returns the outermost directory this call created, so a failed install
/// can remove exactly what it added.
fn prepare_target(target: &Path) -> Result<Option<PathBuf>, AcquisitionError> {
    let created = outermost_missing_ancestor(target);

    let not_writable = |source: io::Error| AcquisitionError::TargetNotWritable {
        path: target.to_path_buf(),
        source,
    };

    if let Err(e) = std::fs::create_dir_all(target) {
        if let Some(dir) = &created {
            let _ = std::fs::remove_dir_all(dir);
        }
        return Err(not_writable(e));
    }

    if let Err(e) = probe_writable(target) {
        if let Some(dir) = &created {
            let _ = std::fs::remove_dir_all(dir);
        }
        return Err(not_writable(e));
    }

    Ok(created)
}

/// Returns the outermost ancestor of `path` (inclusive) that does not exist.
fn outermost_missing_ancestor(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .take_while(|p| !p.as_os_str().is_empty() && !p.exists())
        .last()
        .map(Path::to_path_buf)
}

/// Checks that files can be created in `dir`.
pub(crate) fn probe_writable(dir: &Path) -> io::Result<()> {
    let probe = dir.join(WRITE_PROBE_FILE);
    std::fs::write(&probe, b"")?;
    std::fs::remove_file(&probe)
}

/// Moves every entry of `from` into `to`, replacing existing files.
///
/// Paths in `to` that did not exist before are appended to `added`, even if
/// a later move fails.
async fn move_contents(from: &Path, to: &Path, added: &mut Vec<PathBuf>) -> io::Result<()> {
    let mut entries = tokio::fs::read_dir(from).await?;

    while let Some(entry) = entries.next_entry().await? {
        let source = entry.path();
        let dest = to.join(entry.file_name());

        if tokio::fs::metadata(&dest).await.is_ok() {
            if dest.is_dir() {
                tokio::fs::remove_dir_all(&dest).await?;
            } else {
                tokio::fs::remove_file(&dest).await?;
            }
        } else {
            added.push(dest.clone());
        }

        tokio::fs::rename(&source, &dest).await?;
    }

    Ok(())
}

/// Removes a file or directory tree, ignoring errors.
async fn remove_quietly(path: &Path) {
    let result = match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(_) => return,
    };
    if let Err(e) = result {
        debug!("Failed to remove {}: {}", path.display(), e);
    }
}
