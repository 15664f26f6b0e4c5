//! Front-end operations.
//!
//! These three calls are the whole public contract of the installer. Every
//! call takes the settings explicitly; nothing here keeps global state.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::config::InstallerSettings;
use crate::error::{AcquisitionError, ConfigurationError, InstallModsError};
use crate::manifest;
use crate::scheduler::{self, EventSender, InstallReport, InstallScheduler};
use crate::steamcmd::{paths, DownloadProgress, ToolAcquirer, ToolHandle};

/// Picks the installation root: the explicit one, then the configured one,
/// then the platform default.
pub fn resolve_root(settings: &InstallerSettings, install_dir: Option<&Path>) -> Option<PathBuf> {
    install_dir
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .or_else(|| settings.install_dir.clone())
        .or_else(paths::host_default_root)
}

/// Returns the working SteamCMD for `install_dir`, if there is one.
pub async fn is_installed(
    settings: &InstallerSettings,
    install_dir: Option<&Path>,
) -> Option<ToolHandle> {
    let Some(root) = resolve_root(settings, install_dir) else {
        debug!("No installation root to look for SteamCMD in");
        return None;
    };

    ToolAcquirer::new(settings).is_installed(&root).await
}

/// Installs SteamCMD into `custom_dir`, or under `install_dir`.
///
/// Returns the existing installation untouched if it already works.
pub async fn install<F>(
    settings: &InstallerSettings,
    custom_dir: Option<&Path>,
    install_dir: Option<&Path>,
    progress_cb: F,
) -> Result<ToolHandle, AcquisitionError>
where
    F: Fn(DownloadProgress) + Send + Sync,
{
    let install_dir = install_dir
        .filter(|dir| !dir.as_os_str().is_empty())
        .or(settings.install_dir.as_deref());

    ToolAcquirer::new(settings)
        .install(custom_dir, install_dir, progress_cb)
        .await
}

/// Installs every mod listed in the manifest at `file_path`.
///
/// Checks, in order: the installation root, the manifest, SteamCMD. Each
/// failure aborts the call before any download starts. Once downloads start
/// the call always returns a report, however many items fail.
pub async fn install_mods(
    settings: &InstallerSettings,
    file_path: &Path,
    install_dir: Option<&Path>,
    cancel: &CancelToken,
    events: Option<&EventSender>,
) -> Result<InstallReport, InstallModsError> {
    let root = resolve_root(settings, install_dir).ok_or(ConfigurationError::NoInstallRoot)?;
    let root = scheduler::prepare_root(&root)?;

    let entries = manifest::load(file_path)?;

    let acquirer = ToolAcquirer::new(settings);
    let tool = match acquirer.is_installed(&root).await {
        Some(tool) => tool,
        None if settings.auto_install_tool => {
            info!("SteamCMD missing, installing into {}", root.display());
            acquirer
                .install(None, Some(&root), |progress| {
                    debug!(
                        bytes = progress.bytes_downloaded,
                        total = ?progress.total_bytes,
                        "Downloading SteamCMD"
                    );
                })
                .await?
        }
        None => return Err(ConfigurationError::ToolNotInstalled(paths::tool_dir(&root)).into()),
    };

    let report = InstallScheduler::new(settings.attempt_limits())
        .run(
            &tool,
            &root,
            &entries,
            &settings.scheduler_options(),
            cancel,
            events,
        )
        .await?;

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ManifestError;
    use crate::scheduler::{BatchStatus, InstallOutcome};
    use tempfile::TempDir;

    fn settings() -> InstallerSettings {
        InstallerSettings {
            search_system_path: false,
            verify_timeout_secs: 10,
            attempt_timeout_secs: 10,
            backoff_base_ms: 0,
            max_backoff_ms: 0,
            ..InstallerSettings::default()
        }
    }

    /// SteamCMD stand-in: downloads any item except 999.
    #[cfg(unix)]
    const FAKE_STEAMCMD: &str = r#"#!/bin/sh
root=""; app=""; item=""
while [ $# -gt 0 ]; do
  case "$1" in
    +force_install_dir) root="$2"; shift ;;
    +workshop_download_item) app="$2"; item="$3"; shift 2 ;;
  esac
  shift
done
if [ -n "$item" ]; then
  if [ "$item" = "999" ]; then
    echo "ERROR! Download item $item failed (Failure)."
    exit 8
  fi
  dir="$root/steamapps/workshop/content/$app/$item"
  mkdir -p "$dir"
  echo ok > "$dir/About.xml"
  echo "Success. Downloaded item $item to \"$dir\""
fi
exit 0
"#;

    #[cfg(unix)]
    fn install_fake_steamcmd(root: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let dir = paths::tool_dir(root);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("steamcmd.sh");
        std::fs::write(&path, FAKE_STEAMCMD).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn write_manifest(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("mods.json");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_resolve_root_precedence() {
        let configured = InstallerSettings {
            install_dir: Some(PathBuf::from("/configured")),
            ..settings()
        };

        assert_eq!(
            resolve_root(&configured, Some(Path::new("/explicit"))),
            Some(PathBuf::from("/explicit"))
        );
        assert_eq!(
            resolve_root(&configured, Some(Path::new(""))),
            Some(PathBuf::from("/configured"))
        );
        assert_eq!(resolve_root(&configured, None), Some(PathBuf::from("/configured")));
    }

    #[tokio::test]
    async fn test_is_installed_absent() {
        let temp_dir = TempDir::new().unwrap();
        assert!(is_installed(&settings(), Some(temp_dir.path())).await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_is_installed_and_install_reuse_existing() {
        let temp_dir = TempDir::new().unwrap();
        let binary = install_fake_steamcmd(temp_dir.path());

        let found = is_installed(&settings(), Some(temp_dir.path())).await.unwrap();
        assert_eq!(found.path(), binary);

        let installed = install(&settings(), None, Some(temp_dir.path()), |_| {})
            .await
            .unwrap();
        assert_eq!(installed.path(), binary);
        assert!(!installed.freshly_installed());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_install_mods_end_to_end() {
        let temp_dir = TempDir::new().unwrap();
        install_fake_steamcmd(temp_dir.path());
        let manifest = write_manifest(
            temp_dir.path(),
            r#"[{ "id": "100", "name": "Harmony" }, { "id": "999" }, { "id": 200 }]"#,
        );

        let report = install_mods(
            &settings(),
            &manifest,
            Some(temp_dir.path()),
            &CancelToken::new(),
            None,
        )
        .await
        .unwrap();

        assert_eq!(report.status, BatchStatus::PartialFailure);
        assert!(report.entries[0].outcome.is_success());
        assert_eq!(
            report.entries[1].outcome,
            InstallOutcome::FailedPermanent {
                reason: "ERROR! Download item 999 failed (Failure).".to_string(),
                attempts: 1,
            }
        );
        assert!(report.entries[2].outcome.is_success());
        assert!(paths::item_dir(temp_dir.path(), settings().app_id, "200")
            .join("About.xml")
            .exists());

        // Second run finds everything that succeeded already on disk.
        let again = install_mods(
            &settings(),
            &manifest,
            Some(temp_dir.path()),
            &CancelToken::new(),
            None,
        )
        .await
        .unwrap();
        assert_eq!(again.entries[0].attempts, 0);
        assert_eq!(again.entries[2].attempts, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_install_mods_empty_manifest() {
        let temp_dir = TempDir::new().unwrap();
        install_fake_steamcmd(temp_dir.path());
        let manifest = write_manifest(temp_dir.path(), "[]");

        let root = Some(temp_dir.path());
        let report = install_mods(&settings(), &manifest, root, &CancelToken::new(), None)
            .await
            .unwrap();

        assert_eq!(report.status, BatchStatus::AllSucceeded);
        assert!(report.entries.is_empty());
    }

    #[tokio::test]
    async fn test_install_mods_without_tool() {
        let temp_dir = TempDir::new().unwrap();
        let manifest = write_manifest(temp_dir.path(), r#"[{ "id": "100" }]"#);

        let root = Some(temp_dir.path());
        let result = install_mods(&settings(), &manifest, root, &CancelToken::new(), None).await;

        assert!(matches!(
            result,
            Err(InstallModsError::Configuration(ConfigurationError::ToolNotInstalled(_)))
        ));
    }

    #[tokio::test]
    async fn test_install_mods_reports_manifest_errors_first() {
        let temp_dir = TempDir::new().unwrap();
        let manifest = write_manifest(temp_dir.path(), r#"[{ "name": "no id" }]"#);

        let root = Some(temp_dir.path());
        let result = install_mods(&settings(), &manifest, root, &CancelToken::new(), None).await;

        assert!(matches!(
            result,
            Err(InstallModsError::Manifest(ManifestError::InvalidEntry { index: 0, .. }))
        ));
    }

    #[tokio::test]
    async fn test_install_mods_rejects_unusable_root() {
        let temp_dir = TempDir::new().unwrap();
        let manifest = write_manifest(temp_dir.path(), "[]");

        // A file cannot serve as the installation root.
        let result =
            install_mods(&settings(), &manifest, Some(&manifest), &CancelToken::new(), None).await;

        assert!(matches!(
            result,
            Err(InstallModsError::Configuration(ConfigurationError::RootNotWritable { .. }))
        ));
    }
}
