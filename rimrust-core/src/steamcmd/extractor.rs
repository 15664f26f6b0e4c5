//! Archive extraction for the SteamCMD bootstrap packages.
//!
//! Handles zip (Windows) and tar.gz (macOS, Linux). Both formats go through
//! the same path check: only plain relative paths are written, links and
//! special files are skipped, so nothing can land outside the destination.

use anyhow::{bail, Context, Result};
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

use super::types::ArchiveFormat;

/// Extracts an archive into `dest_dir`, creating it if needed.
///
/// Returns the number of regular files written. An archive without any
/// file is treated as corrupt.
pub fn extract_archive(
    archive_path: &Path,
    dest_dir: &Path,
    format: ArchiveFormat,
) -> Result<usize> {
    info!(
        "Extracting {:?} archive {} to {}",
        format,
        archive_path.display(),
        dest_dir.display()
    );

    fs::create_dir_all(dest_dir)
        .with_context(|| format!("Failed to create directory: {}", dest_dir.display()))?;

    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open archive: {}", archive_path.display()))?;

    let written = match format {
        ArchiveFormat::Zip => extract_zip(file, dest_dir),
        ArchiveFormat::TarGz => {
            let decoder = flate2::read::GzDecoder::new(BufReader::new(file));
            extract_tar(decoder, dest_dir)
        }
    }
    .with_context(|| format!("Failed to unpack {}", archive_path.display()))?;

    if written == 0 {
        bail!("Archive {} contained no files", archive_path.display());
    }

    debug!("Extracted {} files", written);
    Ok(written)
}

/// Reduces an archive path to plain components.
///
/// Returns `None` for absolute paths, `..`, drive prefixes and empty paths.
fn safe_relative(path: &Path) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (!clean.as_os_str().is_empty()).then_some(clean)
}

/// Writes one regular file below `dest_dir`, restoring executable bits.
fn write_file(
    dest_dir: &Path,
    relative: &Path,
    contents: &mut impl Read,
    mode: Option<u32>,
) -> Result<()> {
    let dest = dest_dir.join(relative);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let mut out =
        File::create(&dest).with_context(|| format!("Failed to create: {}", dest.display()))?;
    io::copy(contents, &mut out)
        .with_context(|| format!("Failed to extract: {}", relative.display()))?;

    #[cfg(unix)]
    {
        if mode.is_some_and(|mode| mode & 0o111 != 0) {
            make_executable(&dest)?;
        }
    }
    #[cfg(not(unix))]
    let _ = mode;

    Ok(())
}

// ============================================================================
// Formats
// ============================================================================

fn extract_zip(file: File, dest_dir: &Path) -> Result<usize> {
    let mut archive = zip::ZipArchive::new(file).context("Not a zip archive")?;

    let mut written = 0;
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .with_context(|| format!("Failed to read zip entry {}", index))?;

        let Some(relative) = entry.enclosed_name().as_deref().and_then(safe_relative) else {
            warn!("Skipping unsafe path in zip: {}", entry.name());
            continue;
        };

        if entry.is_dir() {
            fs::create_dir_all(dest_dir.join(&relative))?;
        } else {
            let mode = entry.unix_mode();
            write_file(dest_dir, &relative, &mut entry, mode)?;
            written += 1;
        }
    }

    Ok(written)
}

fn extract_tar(reader: impl Read, dest_dir: &Path) -> Result<usize> {
    let mut archive = tar::Archive::new(reader);

    let mut written = 0;
    for entry in archive.entries().context("Not a tar archive")? {
        let mut entry = entry.context("Failed to read tar entry")?;
        let kind = entry.header().entry_type();
        let path = entry.path()?.into_owned();

        let Some(relative) = safe_relative(&path) else {
            warn!("Skipping unsafe path in tar: {}", path.display());
            continue;
        };

        if kind.is_dir() {
            fs::create_dir_all(dest_dir.join(&relative))?;
        } else if kind.is_file() {
            let mode = entry.header().mode().ok();
            write_file(dest_dir, &relative, &mut entry, mode)?;
            written += 1;
        } else {
            // Links could point anywhere; the SteamCMD archives contain none.
            warn!("Skipping {:?} entry {}", kind, path.display());
        }
    }

    Ok(written)
}

/// Adds the executable bits to a file. No-op on Windows.
pub fn make_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let mut permissions = fs::metadata(path)
            .with_context(|| format!("Failed to stat {}", path.display()))?
            .permissions();
        permissions.set_mode(permissions.mode() | 0o755);
        fs::set_permissions(path, permissions)
            .with_context(|| format!("Failed to make {} executable", path.display()))?;
    }
    #[cfg(not(unix))]
    let _ = path;

    Ok(())
}
