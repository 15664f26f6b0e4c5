//! The seam between the scheduler and the SteamCMD process.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::steamcmd::process::{run_supervised, ProcessLimits, RunOutcome};

/// One workshop download to perform.
#[derive(Debug, Clone, Copy)]
pub struct DownloadRequest<'a> {
    /// SteamCMD executable.
    pub tool: &'a Path,
    /// Installation root passed as `+force_install_dir`.
    pub root: &'a Path,
    pub app_id: u32,
    pub item_id: &'a str,
}

/// Runs one workshop download attempt.
///
/// Implementations must not return before any process they started has been
/// reaped.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Performs one attempt. `Err` means the tool could not be run at all.
    async fn download(
        &self,
        request: DownloadRequest<'_>,
        cancel: &CancelToken,
    ) -> std::io::Result<RunOutcome>;
}

/// Builds the SteamCMD argument list for one workshop download.
pub fn steamcmd_args(root: &Path, app_id: u32, item_id: &str) -> Vec<OsString> {
    vec![
        "+force_install_dir".into(),
        root.as_os_str().to_os_string(),
        "+login".into(),
        "anonymous".into(),
        "+workshop_download_item".into(),
        app_id.to_string().into(),
        item_id.into(),
        "validate".into(),
        "+quit".into(),
    ]
}

/// Invokes the real SteamCMD binary under supervision.
#[derive(Debug, Clone, Copy)]
pub struct SteamCmdInvoker {
    limits: ProcessLimits,
}

impl SteamCmdInvoker {
    pub fn new(limits: ProcessLimits) -> Self {
        Self { limits }
    }
}

#[async_trait]
impl ToolInvoker for SteamCmdInvoker {
    async fn download(
        &self,
        request: DownloadRequest<'_>,
        cancel: &CancelToken,
    ) -> std::io::Result<RunOutcome> {
        let mut cmd = Command::new(request.tool);
        cmd.args(steamcmd_args(request.root, request.app_id, request.item_id));
        if let Some(dir) = request.tool.parent() {
            cmd.current_dir(dir);
        }

        debug!(id = request.item_id, tool = %request.tool.display(), "Invoking SteamCMD");
        run_supervised(cmd, self.limits, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steamcmd_args() {
        let args = steamcmd_args(Path::new("/games/rimrust"), 294100, "2009463077");
        let args: Vec<_> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "+force_install_dir",
                "/games/rimrust",
                "+login",
                "anonymous",
                "+workshop_download_item",
                "294100",
                "2009463077",
                "validate",
                "+quit",
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invoker_passes_arguments() {
        use std::os::unix::fs::PermissionsExt;
        use std::time::Duration;
        use tempfile::TempDir;

        let temp_dir = TempDir::new().unwrap();
        let tool = temp_dir.path().join("steamcmd.sh");
        std::fs::write(&tool, "#!/bin/sh\necho \"$@\"\n").unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let invoker = SteamCmdInvoker::new(ProcessLimits {
            timeout: Duration::from_secs(10),
            grace_period: Duration::from_secs(1),
        });
        let request = DownloadRequest {
            tool: &tool,
            root: temp_dir.path(),
            app_id: 294100,
            item_id: "100",
        };

        let outcome = invoker.download(request, &CancelToken::new()).await.unwrap();
        assert!(outcome
            .output()
            .contains("+login anonymous +workshop_download_item 294100 100 validate +quit"));
    }
}
