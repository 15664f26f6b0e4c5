//! RimRust command-line front-end
//!
//! Installs RimWorld Steam Workshop mods through SteamCMD.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use futures::stream::{self, Stream, StreamExt};
use std::process::ExitCode;

use rimrust_core::{
    event_channel, BatchStatus, CancelToken, EventReceiver, InstallEvent, InstallReport,
    InstallerSettings,
};

use crate::cli::{Cli, Commands, InstallArgs, InstallModsArgs};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rimrust=debug".parse()?)
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting RimRust v{}", rimrust_core::VERSION);

    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    let install_dir = cli.install_dir.as_deref();

    match cli.command {
        Commands::IsInstalled => match rimrust_core::is_installed(&settings, install_dir).await {
            Some(handle) => {
                println!("{}", handle.path().display());
                Ok(ExitCode::SUCCESS)
            }
            None => {
                eprintln!("SteamCMD is not installed");
                Ok(ExitCode::FAILURE)
            }
        },
        Commands::Install(args) => run_install(&settings, install_dir, args).await,
        Commands::InstallMods(args) => run_install_mods(settings, install_dir, args).await,
    }
}

/// Load settings from `--config` or the default location.
fn load_settings(cli: &Cli) -> Result<InstallerSettings> {
    match cli.config.clone().or_else(InstallerSettings::default_path) {
        Some(path) => InstallerSettings::load_from(&path),
        None => {
            tracing::warn!("No config directory on this platform, using default settings");
            Ok(InstallerSettings::default())
        }
    }
}

async fn run_install(
    settings: &InstallerSettings,
    install_dir: Option<&std::path::Path>,
    args: InstallArgs,
) -> Result<ExitCode> {
    let custom_dir = args.custom_dir.as_deref();
    let handle = rimrust_core::install(settings, custom_dir, install_dir, |progress| {
        if let Some(percent) = progress.percent {
            eprint!("\rDownloading SteamCMD: {:.1}%", percent);
        }
    })
    .await?;

    if handle.freshly_installed() {
        eprintln!();
    }
    println!("{}", handle.path().display());
    Ok(ExitCode::SUCCESS)
}

async fn run_install_mods(
    mut settings: InstallerSettings,
    install_dir: Option<&std::path::Path>,
    args: InstallModsArgs,
) -> Result<ExitCode> {
    if let Some(limit) = args.concurrency {
        settings.concurrency_limit = limit;
    }
    if let Some(attempts) = args.max_attempts {
        settings.max_attempts = attempts;
    }
    settings.refresh_existing |= args.refresh;
    settings.auto_install_tool |= args.auto_install;
    settings.validate();

    let cancel = CancelToken::new();
    tokio::spawn(handle_interrupts(ctrl_c_stream(), cancel.clone(), || {
        std::process::exit(130)
    }));

    let (tx, rx) = event_channel();
    let printer = tokio::spawn(print_events(rx));

    let result =
        rimrust_core::install_mods(&settings, &args.manifest, install_dir, &cancel, Some(&tx))
            .await;
    drop(tx);
    let _ = printer.await;

    let report = result
        .with_context(|| format!("Cannot install mods from {}", args.manifest.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(match report.status {
        BatchStatus::AllSucceeded => ExitCode::SUCCESS,
        BatchStatus::PartialFailure | BatchStatus::TotalFailure => ExitCode::FAILURE,
    })
}

/// First interrupt cancels the batch and lets running downloads stop within
/// their grace period. A second one calls `force_quit`.
async fn handle_interrupts<S, F>(mut interrupts: S, cancel: CancelToken, force_quit: F)
where
    S: Stream<Item = ()> + Unpin,
    F: FnOnce(),
{
    if interrupts.next().await.is_none() {
        return;
    }
    eprintln!("Cancelling, waiting for downloads to stop (Ctrl-C again to quit)...");
    cancel.cancel();

    if interrupts.next().await.is_some() {
        eprintln!("Interrupted");
        force_quit();
    }
}

fn ctrl_c_stream() -> impl Stream<Item = ()> + Unpin {
    Box::pin(stream::unfold((), |()| async {
        tokio::signal::ctrl_c().await.ok().map(|()| ((), ()))
    }))
}

async fn print_events(mut rx: EventReceiver) {
    while let Some(event) = rx.recv().await {
        match event {
            InstallEvent::EntryStarted { id, attempt, .. } if attempt > 1 => {
                eprintln!("[{}] attempt {}", id, attempt);
            }
            InstallEvent::EntryRetrying { id, delay, reason, .. } => {
                eprintln!("[{}] {} (retrying in {:?})", id, reason, delay);
            }
            InstallEvent::EntryFinished { id, outcome, .. } => {
                eprintln!("[{}] {}", id, outcome);
            }
            _ => {}
        }
    }
}

fn print_report(report: &InstallReport) {
    for entry in &report.entries {
        println!("{:<40} {}", entry.entry.to_string(), entry.outcome);
    }
    println!();
    println!(
        "{} in {}s",
        report.summary(),
        (report.finished_at - report.started_at).num_seconds()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_first_interrupt_cancels_batch() {
        let cancel = CancelToken::new();
        let quit = AtomicBool::new(false);

        handle_interrupts(stream::iter([()]), cancel.clone(), || {
            quit.store(true, Ordering::SeqCst)
        })
        .await;

        assert!(cancel.is_cancelled());
        assert!(!quit.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_second_interrupt_forces_quit() {
        let cancel = CancelToken::new();
        let quit = AtomicBool::new(false);

        handle_interrupts(stream::iter([(), ()]), cancel.clone(), || {
            quit.store(true, Ordering::SeqCst)
        })
        .await;

        assert!(cancel.is_cancelled());
        assert!(quit.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_no_interrupt_leaves_batch_running() {
        let cancel = CancelToken::new();

        handle_interrupts(stream::empty(), cancel.clone(), || panic!("quit")).await;

        assert!(!cancel.is_cancelled());
    }
}
