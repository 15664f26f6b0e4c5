//! SteamCMD acquisition and supervision.
//!
//! SteamCMD is downloaded on demand into the installation root and driven as
//! a subprocess for every workshop download.
//!
//! # Architecture
//!
//! - `types`: Core types (HostOs, ArchiveFormat, ToolHandle)
//! - `paths`: Platform defaults and the on-disk layout under a root
//! - `catalog`: Download locations of the bootstrap archives
//! - `downloader`: Async file download with progress reporting
//! - `extractor`: Archive extraction (zip, tar.gz)
//! - `process`: Supervised subprocess execution with timeout and cancellation
//! - `acquirer`: High-level API for detecting and installing SteamCMD
//!
//! # Example
//!
//! ```ignore
//! use rimrust_core::steamcmd::ToolAcquirer;
//!
//! let acquirer = ToolAcquirer::new(&settings);
//!
//! let handle = acquirer.install(None, Some(root), |progress| {
//!     if let Some(percent) = progress.percent {
//!         println!("Progress: {:.1}%", percent);
//!     }
//! }).await?;
//!
//! println!("SteamCMD at {}", handle.path().display());
//! ```

pub mod acquirer;
pub mod catalog;
pub mod downloader;
pub mod extractor;
pub mod paths;
pub mod process;
pub mod types;

pub use acquirer::ToolAcquirer;
pub use downloader::DownloadProgress;
pub use paths::{default_root, default_tool_path, item_dir, tool_dir, workshop_content_dir};
pub use process::{ProcessLimits, RunOutcome};
pub use types::{ArchiveFormat, HostOs, ToolHandle};
