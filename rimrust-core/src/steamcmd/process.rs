//! Supervised SteamCMD subprocess execution.
//!
//! Every run is bounded by a timeout and can be interrupted by a
//! [`CancelToken`]. Whatever happens, the child is reaped before
//! [`run_supervised`] returns.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cancel::CancelToken;

/// Maximum characters of output kept per run (the tail is kept).
const MAX_OUTPUT_CHARS: usize = 50_000;

/// How long to wait for the output pipes to close once the child is reaped.
const PIPE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Spawn attempts made while the executable is busy.
#[cfg_attr(not(unix), allow(dead_code))]
const SPAWN_BUSY_RETRIES: u32 = 5;

/// Time limits for one supervised run.
#[derive(Debug, Clone, Copy)]
pub struct ProcessLimits {
    /// Wall-clock limit for the whole run.
    pub timeout: Duration,
    /// Time a cancelled process gets to exit before it is killed.
    pub grace_period: Duration,
}

/// How a supervised run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The process exited on its own.
    Exited {
        code: Option<i32>,
        success: bool,
        output: String,
    },
    /// The timeout elapsed; the process was killed.
    TimedOut { output: String },
    /// Cancellation was requested while the process ran.
    ///
    /// `exited_cleanly` is true when the process exited successfully within
    /// its grace period instead of being killed.
    Cancelled { exited_cleanly: bool, output: String },
}

impl RunOutcome {
    pub fn output(&self) -> &str {
        match self {
            Self::Exited { output, .. }
            | Self::TimedOut { output }
            | Self::Cancelled { output, .. } => output,
        }
    }
}

enum Ending {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
}

/// Spawns `cmd` and supervises it until it exits, times out or is cancelled.
///
/// # Errors
///
/// Returns an error only if the process cannot be spawned or waited on.
pub async fn run_supervised(
    mut cmd: Command,
    limits: ProcessLimits,
    cancel: &CancelToken,
) -> std::io::Result<RunOutcome> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .env("TERM", "dumb")
        .env("NO_COLOR", "1");

    // Own process group so the whole tree (steamcmd.sh and the real binary
    // it launches) can be signalled together.
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = spawn(&mut cmd).await?;
    let pid = child.id();
    debug!(?pid, "Spawned supervised process");

    let stdout_task = tokio::spawn(read_lines(child.stdout.take()));
    let stderr_task = tokio::spawn(read_lines(child.stderr.take()));

    let ending = tokio::select! {
        status = child.wait() => Ending::Exited(status?),
        _ = tokio::time::sleep(limits.timeout) => Ending::TimedOut,
        _ = cancel.cancelled() => Ending::Cancelled,
    };

    let ending = match ending {
        Ending::Exited(status) => {
            // Children of the launcher may outlive it and hold the pipes.
            kill_group(pid);
            Ending::Exited(status)
        }
        Ending::TimedOut => {
            warn!(timeout = ?limits.timeout, "Process timed out, killing");
            force_kill(&mut child, pid).await;
            Ending::TimedOut
        }
        Ending::Cancelled => match terminate(&mut child, pid, limits.grace_period).await {
            Some(status) if status.success() => Ending::Exited(status),
            _ => Ending::Cancelled,
        },
    };

    let mut lines = join_reader(stdout_task).await;
    lines.extend(join_reader(stderr_task).await);
    let output = truncate_tail(lines.join("\n"));

    Ok(match ending {
        Ending::Exited(status) if cancel.is_cancelled() && status.success() => {
            RunOutcome::Cancelled {
                exited_cleanly: true,
                output,
            }
        }
        Ending::Exited(status) => RunOutcome::Exited {
            code: status.code(),
            success: status.success(),
            output,
        },
        Ending::TimedOut => RunOutcome::TimedOut { output },
        Ending::Cancelled => RunOutcome::Cancelled {
            exited_cleanly: false,
            output,
        },
    })
}

/// Spawns `cmd`, retrying briefly while a just-written executable is still
/// held open for writing by a concurrently forked process (`ETXTBSY`).
async fn spawn(cmd: &mut Command) -> std::io::Result<Child> {
    let mut attempts = 0;
    loop {
        match cmd.spawn() {
            #[cfg(unix)]
            Err(e) if e.raw_os_error() == Some(libc::ETXTBSY) && attempts < SPAWN_BUSY_RETRIES => {
                attempts += 1;
                tokio::time::sleep(Duration::from_millis(20 * u64::from(attempts))).await;
            }
            result => return result,
        }
    }
}

/// Asks the process to stop, waits out the grace period, then kills it.
///
/// Returns the exit status if the process stopped on its own.
async fn terminate(
    child: &mut Child,
    pid: Option<u32>,
    grace_period: Duration,
) -> Option<ExitStatus> {
    if !request_termination(pid) {
        force_kill(child, pid).await;
        return None;
    }

    match tokio::time::timeout(grace_period, child.wait()).await {
        Ok(Ok(status)) => {
            debug!(?status, "Process exited within grace period");
            kill_group(pid);
            Some(status)
        }
        _ => {
            warn!(grace = ?grace_period, "Process ignored termination request, killing");
            force_kill(child, pid).await;
            None
        }
    }
}

async fn force_kill(child: &mut Child, pid: Option<u32>) {
    kill_group(pid);

    if let Err(e) = child.start_kill() {
        debug!("start_kill failed (process likely already exited): {}", e);
    }
    if let Err(e) = child.wait().await {
        warn!("Failed to reap killed process: {}", e);
    }
}

#[cfg(unix)]
fn request_termination(pid: Option<u32>) -> bool {
    match pid {
        Some(pid) => {
            signal_group(pid, libc::SIGTERM);
            true
        }
        None => false,
    }
}

#[cfg(not(unix))]
fn request_termination(_pid: Option<u32>) -> bool {
    false
}

#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        signal_group(pid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

/// Sends `signal` to the process group led by `pgid`.
#[cfg(unix)]
fn signal_group(pgid: u32, signal: libc::c_int) {
    // SAFETY: kill(2) has no memory-safety preconditions; a negative pid
    // addresses the process group created via `process_group(0)`.
    unsafe {
        libc::kill(-(pgid as libc::pid_t), signal);
    }
}

/// Collects output lines until EOF.
///
/// SteamCMD output is not guaranteed to be UTF-8, so lines are decoded
/// lossily. The pipe must stay open until the child closes it: dropping the
/// read end early would kill the child with SIGPIPE on its next write.
async fn read_lines<R: AsyncRead + Unpin>(reader: Option<R>) -> Vec<String> {
    let mut collected = Vec::new();
    let Some(reader) = reader else {
        return collected;
    };

    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                collected.push(line.trim_end_matches(['\n', '\r']).to_string());
            }
            Err(e) => {
                debug!("Stopped reading process output: {}", e);
                break;
            }
        }
    }
    collected
}

async fn join_reader(task: JoinHandle<Vec<String>>) -> Vec<String> {
    let abort = task.abort_handle();
    match tokio::time::timeout(PIPE_DRAIN_TIMEOUT, task).await {
        Ok(Ok(lines)) => lines,
        _ => {
            abort.abort();
            Vec::new()
        }
    }
}

fn truncate_tail(mut output: String) -> String {
    if output.len() <= MAX_OUTPUT_CHARS {
        return output;
    }
    let mut cut = output.len() - MAX_OUTPUT_CHARS;
    while !output.is_char_boundary(cut) {
        cut += 1;
    }
    output.replace_range(..cut, "[OUTPUT TRUNCATED]\n");
    output
}
