//! Streaming download of the SteamCMD bootstrap archive.
//!
//! Only HTTPS URLs on Valve's CDN hosts are fetched. The body is streamed to
//! disk while being hashed, and the destination file is removed again if the
//! download does not complete.

use anyhow::{bail, Context, Result};
use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

/// Hosts Valve serves SteamCMD from. Subdomains are accepted too.
const ALLOWED_HOSTS: &[&str] = &["steamcdn-a.akamaihd.net", "media.steampowered.com"];

/// Connection timeout for the download request.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Parses `url` and checks it points at an allowed host over HTTPS.
fn check_source(url: &str) -> Result<Url> {
    let parsed = Url::parse(url).with_context(|| format!("Invalid URL: {}", url))?;

    if parsed.scheme() != "https" {
        bail!("Refusing non-HTTPS download: {}", url);
    }

    let Some(host) = parsed.host_str() else {
        bail!("URL has no host: {}", url);
    };

    let trusted = ALLOWED_HOSTS.iter().any(|allowed| {
        host == *allowed
            || host
                .strip_suffix(allowed)
                .is_some_and(|prefix| prefix.ends_with('.'))
    });
    if !trusted {
        bail!("Refusing download from untrusted host {}", host);
    }

    Ok(parsed)
}

// ============================================================================
// Progress
// ============================================================================

/// Snapshot of a running download.
#[derive(Debug, Clone)]
pub struct DownloadProgress {
    pub bytes_downloaded: u64,
    /// From the Content-Length header, if the server sent one.
    pub total_bytes: Option<u64>,
    /// 0.0 to 100.0, or `None` if the total is unknown.
    pub percent: Option<f32>,
}

impl DownloadProgress {
    fn at(bytes_downloaded: u64, total_bytes: Option<u64>) -> Self {
        let percent = match total_bytes {
            Some(0) => Some(0.0),
            Some(total) => Some(bytes_downloaded as f32 * 100.0 / total as f32),
            None => None,
        };
        Self {
            bytes_downloaded,
            total_bytes,
            percent,
        }
    }
}

// ============================================================================
// Download
// ============================================================================

/// Removes a file on drop unless disarmed.
struct PartialFile {
    path: Option<PathBuf>,
}

impl PartialFile {
    fn new(path: &Path) -> Self {
        Self {
            path: Some(path.to_path_buf()),
        }
    }

    fn keep(mut self) {
        self.path = None;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            debug!("Removing incomplete download {}", path.display());
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Downloads `url` to `dest`, reporting progress after every chunk.
///
/// Returns the number of bytes written.
///
/// # Errors
///
/// Fails if the URL is not trusted, the request or stream fails, the server
/// answers with an error status, fewer bytes than announced arrive, or the
/// SHA256 digest differs from `expected_sha256`. No file is left behind on
/// failure.
pub async fn download_file<F>(
    url: &str,
    dest: &Path,
    expected_sha256: Option<&str>,
    progress_cb: F,
) -> Result<u64>
where
    F: Fn(DownloadProgress),
{
    let source = check_source(url)?;
    info!("Downloading {} to {}", source, dest.display());

    let client = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")?;

    let response = client
        .get(source)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .with_context(|| format!("Request to {} failed", url))?;

    let total = response.content_length();
    let mut file = File::create(dest)
        .await
        .with_context(|| format!("Failed to create {}", dest.display()))?;
    let guard = PartialFile::new(dest);

    let mut hasher = Sha256::new();
    let mut received: u64 = 0;
    let mut body = response.bytes_stream();
    progress_cb(DownloadProgress::at(0, total));

    while let Some(chunk) = body.next().await {
        let chunk = chunk.context("Connection dropped during download")?;
        hasher.update(&chunk);
        file.write_all(&chunk)
            .await
            .with_context(|| format!("Failed to write {}", dest.display()))?;
        received += chunk.len() as u64;
        progress_cb(DownloadProgress::at(received, total));
    }
    file.flush().await.context("Failed to flush download")?;
    drop(file);

    if let Some(total) = total.filter(|total| *total != received) {
        bail!("Download truncated: received {} of {} bytes", received, total);
    }

    if let Some(expected) = expected_sha256 {
        let actual = to_hex(&hasher.finalize());
        if !actual.eq_ignore_ascii_case(expected) {
            bail!("SHA256 mismatch: expected {}, got {}", expected, actual);
        }
        debug!("SHA256 verified: {}", actual);
    }

    guard.keep();
    info!("Downloaded {} bytes", received);
    Ok(received)
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut hex, b| {
        let _ = write!(hex, "{:02x}", b);
        hex
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_progress_percent() {
        let progress = DownloadProgress::at(50, Some(200));
        assert_eq!(progress.percent, Some(25.0));
        assert_eq!(DownloadProgress::at(50, None).percent, None);
        assert_eq!(DownloadProgress::at(0, Some(0)).percent, Some(0.0));
    }

    #[test]
    fn test_check_source_accepts_valve_hosts() {
        assert!(
            check_source("https://steamcdn-a.akamaihd.net/client/installer/steamcmd.zip").is_ok()
        );
        assert!(check_source("https://media.steampowered.com/installer/steamcmd.zip").is_ok());
        assert!(check_source("https://cdn.media.steampowered.com/steamcmd.zip").is_ok());
    }

    #[test]
    fn test_check_source_rejects_everything_else() {
        for url in [
            "http://steamcdn-a.akamaihd.net/client/installer/steamcmd.zip",
            "https://evil.com/steamcmd.zip",
            "https://steamcdn-a.akamaihd.net.evil.org/steamcmd.zip",
            "https://notmedia.steampowered.com/steamcmd.zip",
            "file:///etc/passwd",
            "not a url",
        ] {
            assert!(check_source(url).is_err(), "accepted {}", url);
        }
    }

    #[test]
    fn test_to_hex() {
        assert_eq!(
            to_hex(&Sha256::digest(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_partial_file_guard() {
        let temp_dir = TempDir::new().unwrap();
        let dropped = temp_dir.path().join("dropped");
        let kept = temp_dir.path().join("kept");
        std::fs::write(&dropped, b"x").unwrap();
        std::fs::write(&kept, b"x").unwrap();

        drop(PartialFile::new(&dropped));
        PartialFile::new(&kept).keep();

        assert!(!dropped.exists());
        assert!(kept.exists());
    }

    #[tokio::test]
    async fn test_untrusted_host_creates_no_file() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("steamcmd.zip");

        let result = download_file("https://evil.com/steamcmd.zip", &dest, None, |_| {}).await;

        assert!(result.is_err());
        assert!(!dest.exists());
    }
}
