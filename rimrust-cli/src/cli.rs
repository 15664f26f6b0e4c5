//! CLI definitions using clap derive API

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// RimRust - RimWorld workshop mod installer
#[derive(Parser, Debug)]
#[command(
    name = "rimrust",
    author,
    version,
    about = "Install RimWorld Steam Workshop mods through SteamCMD",
    after_help = "EXAMPLES:\n  \
                  rimrust is-installed\n  \
                  rimrust install --install-dir ~/RimRust\n  \
                  rimrust install-mods mods.json --concurrency 3"
)]
pub struct Cli {
    /// Settings file (defaults to the platform config directory)
    #[arg(long, short = 'c', global = true, env = "RIMRUST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Installation root (defaults to the configured or platform default)
    #[arg(long, short = 'd', global = true, env = "RIMRUST_INSTALL_DIR")]
    pub install_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the path of a working SteamCMD, if there is one
    IsInstalled,

    /// Download and verify SteamCMD
    Install(InstallArgs),

    /// Install every mod listed in a manifest
    InstallMods(InstallModsArgs),
}

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Directory to install SteamCMD into, used as is
    #[arg(long)]
    pub custom_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct InstallModsArgs {
    /// Manifest file (JSON list of workshop items)
    pub manifest: PathBuf,

    /// Number of SteamCMD processes to run at once
    #[arg(long, short = 'j')]
    pub concurrency: Option<usize>,

    /// Attempts per item, including the first
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Download items again even if already present
    #[arg(long)]
    pub refresh: bool,

    /// Install SteamCMD first if it is missing
    #[arg(long)]
    pub auto_install: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing_install_mods() {
        let cli = Cli::try_parse_from([
            "rimrust",
            "install-mods",
            "mods.json",
            "-j",
            "4",
            "--refresh",
            "--install-dir",
            "/games/rimrust",
        ])
        .unwrap();

        assert_eq!(cli.install_dir, Some(PathBuf::from("/games/rimrust")));
        match cli.command {
            Commands::InstallMods(args) => {
                assert_eq!(args.manifest, PathBuf::from("mods.json"));
                assert_eq!(args.concurrency, Some(4));
                assert!(args.refresh);
                assert!(!args.auto_install);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_parsing_install() {
        let cli =
            Cli::try_parse_from(["rimrust", "install", "--custom-dir", "/opt/steamcmd"]).unwrap();
        match cli.command {
            Commands::Install(args) => {
                assert_eq!(args.custom_dir, Some(PathBuf::from("/opt/steamcmd")));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_requires_manifest() {
        assert!(Cli::try_parse_from(["rimrust", "install-mods"]).is_err());
    }
}
