//! Installer settings for RimRust.
//!
//! Settings are persisted as a JSON file. Every field has a default so a
//! partial file (or none at all) is valid.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::scheduler::{RetryPolicy, SchedulerOptions};
use crate::steamcmd::process::ProcessLimits;

/// Steam app id of RimWorld, whose workshop RimRust installs from.
pub const RIMWORLD_APP_ID: u32 = 294100;

/// File name of the settings file inside the config directory.
const SETTINGS_FILE: &str = "settings.json";

// =============================================================================
// Installer Settings
// =============================================================================

/// Installer settings - persisted to disk as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerSettings {
    /// Steam app whose workshop items are downloaded.
    pub app_id: u32,

    /// Preferred installation root. Falls back to the platform default.
    pub install_dir: Option<PathBuf>,

    /// Number of SteamCMD processes allowed to run at once.
    pub concurrency_limit: usize,

    /// Attempts per workshop item, including the first.
    pub max_attempts: u32,

    /// Delay before the first retry; doubles on each further retry.
    pub backoff_base_ms: u64,

    /// Upper bound for the retry delay.
    pub max_backoff_ms: u64,

    /// Time limit for a single SteamCMD download attempt.
    pub attempt_timeout_secs: u64,

    /// Time limit for the `+quit` check that verifies an installation.
    pub verify_timeout_secs: u64,

    /// Time a cancelled SteamCMD process gets before it is killed.
    pub cancel_grace_period_secs: u64,

    /// Re-run SteamCMD for items already present on disk.
    pub refresh_existing: bool,

    /// Accept a `steamcmd` found on PATH when none exists under the root.
    pub search_system_path: bool,

    /// Let `install_mods` download SteamCMD when it is missing.
    pub auto_install_tool: bool,
}

impl Default for InstallerSettings {
    fn default() -> Self {
        Self {
            app_id: RIMWORLD_APP_ID,
            install_dir: None,
            // Two parallel downloads stays clear of Steam's per-IP rate limits.
            concurrency_limit: 2,
            max_attempts: 3,
            backoff_base_ms: 2_000,
            max_backoff_ms: 30_000,
            attempt_timeout_secs: 15 * 60,
            // First run of SteamCMD self-updates, which takes a while.
            verify_timeout_secs: 120,
            cancel_grace_period_secs: 5,
            refresh_existing: false,
            search_system_path: true,
            auto_install_tool: false,
        }
    }
}

impl InstallerSettings {
    /// Returns the default settings file location.
    ///
    /// Path: `{config_dir}/rimrust/settings.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("rimrust").join(SETTINGS_FILE))
    }

    /// Loads settings from a JSON file.
    ///
    /// A missing file yields defaults. A file that exists but cannot be
    /// parsed logs a warning and yields defaults. An unreadable file is an
    /// error.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("Settings not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;

        let mut settings = match serde_json::from_str::<Self>(&content) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(
                    error = %e,
                    path = %path.display(),
                    "Failed to parse settings, using defaults"
                );
                Self::default()
            }
        };
        settings.validate();
        Ok(settings)
    }

    /// Saves settings as pretty-printed JSON, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory: {}", parent.display())
            })?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write settings to {}", path.display()))?;

        debug!("Settings saved to {}", path.display());
        Ok(())
    }

    /// Validate and clamp settings to valid ranges.
    pub fn validate(&mut self) {
        self.concurrency_limit = self.concurrency_limit.clamp(1, 16);
        self.max_attempts = self.max_attempts.clamp(1, 10);
        self.max_backoff_ms = self.max_backoff_ms.max(self.backoff_base_ms);
        self.attempt_timeout_secs = self.attempt_timeout_secs.max(1);
        self.verify_timeout_secs = self.verify_timeout_secs.max(1);

        if self
            .install_dir
            .as_ref()
            .is_some_and(|dir| dir.as_os_str().is_empty())
        {
            self.install_dir = None;
        }
    }

    /// Retry policy for workshop downloads.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.backoff_base_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }

    /// Scheduler options derived from these settings.
    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            app_id: self.app_id,
            concurrency_limit: self.concurrency_limit,
            retry: self.retry_policy(),
            refresh_existing: self.refresh_existing,
        }
    }

    /// Limits for one SteamCMD download attempt.
    pub fn attempt_limits(&self) -> ProcessLimits {
        ProcessLimits {
            timeout: Duration::from_secs(self.attempt_timeout_secs),
            grace_period: Duration::from_secs(self.cancel_grace_period_secs),
        }
    }

    /// Limits for the installation check.
    pub fn verify_limits(&self) -> ProcessLimits {
        ProcessLimits {
            timeout: Duration::from_secs(self.verify_timeout_secs),
            grace_period: Duration::from_secs(self.cancel_grace_period_secs),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
