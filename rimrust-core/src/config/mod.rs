//! Configuration module for RimRust.
//!
//! Manages installer settings stored as a JSON file.

mod settings;

pub use settings::{InstallerSettings, RIMWORLD_APP_ID};
