//! Classification of a finished SteamCMD attempt.
//!
//! SteamCMD's exit code alone is unreliable: it can exit 0 after a failed
//! download, so success also requires the item directory to be populated.

use regex::Regex;
use std::sync::LazyLock;

use super::report::InstallOutcome;
use crate::steamcmd::RunOutcome;

/// Longest reason kept from SteamCMD output.
const MAX_REASON_CHARS: usize = 300;

/// Signatures of failures that a retry may fix. Matched against error lines
/// only, so progress output such as "1,503 of 39,000 KB" cannot trigger it.
static TRANSIENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)(time[d ]?\s?out|rate[ -]?limit|limit exceeded|too many requests",
        r"|http\s*(error\s*|status\s*)?(429|503)\b|\((429|503)\)|service unavailable",
        r"|no connection|not connected|connection (reset|refused|lost|closed)",
        r"|\bnetwork\b|\bbusy\b|try again)",
    ))
    .expect("transient signature pattern is valid")
});

/// Output reporting that the item needed no download.
static UP_TO_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(already up[ -]to[ -]date|no update (is )?(needed|required))")
        .expect("up-to-date pattern is valid")
});

/// Lines SteamCMD uses to report a failure.
static ERROR_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(error!|\bfailed\b|\bfailure\b)").expect("error line pattern is valid")
});

/// Classifies one attempt.
///
/// Returns `Succeeded`, `FailedTransient` or `FailedPermanent` (carrying
/// `attempt`). Cancelled runs are the caller's business and classify as a
/// transient failure.
pub fn classify(outcome: &RunOutcome, artifact_present: bool, attempt: u32) -> InstallOutcome {
    let output = outcome.output();

    match outcome {
        RunOutcome::Exited { success: true, .. } if artifact_present => InstallOutcome::Succeeded,
        RunOutcome::TimedOut { .. } => InstallOutcome::FailedTransient {
            reason: "timed out".to_string(),
        },
        RunOutcome::Cancelled { .. } => InstallOutcome::FailedTransient {
            reason: "cancelled".to_string(),
        },
        RunOutcome::Exited { .. } if UP_TO_DATE.is_match(output) => InstallOutcome::Succeeded,
        RunOutcome::Exited { code, success, .. } => {
            let fallback = if *success {
                "SteamCMD reported success but the item was not downloaded".to_string()
            } else {
                match code {
                    Some(code) => format!("SteamCMD exited with code {}", code),
                    None => "SteamCMD was terminated by a signal".to_string(),
                }
            };
            let reason = extract_reason(output).unwrap_or(fallback);

            if is_transient(output, &reason) {
                InstallOutcome::FailedTransient { reason }
            } else {
                InstallOutcome::FailedPermanent {
                    reason,
                    attempts: attempt,
                }
            }
        }
    }
}

/// Whether an error line, or the reason picked for the failure, carries a
/// transient signature.
fn is_transient(output: &str, reason: &str) -> bool {
    output
        .lines()
        .filter(|line| ERROR_LINE.is_match(line))
        .chain(std::iter::once(reason))
        .any(|line| TRANSIENT.is_match(line))
}

/// Picks the most informative line of output: the last error line if there
/// is one, otherwise the last non-empty line.
pub fn extract_reason(output: &str) -> Option<String> {
    let lines = || output.lines().map(str::trim).filter(|l| !l.is_empty());

    let line = lines()
        .filter(|l| ERROR_LINE.is_match(l))
        .last()
        .or_else(|| lines().last())?;

    Some(truncate(line))
}

fn truncate(line: &str) -> String {
    match line.char_indices().nth(MAX_REASON_CHARS) {
        Some((cut, _)) => format!("{}...", &line[..cut]),
        None => line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exited(code: i32, output: &str) -> RunOutcome {
        RunOutcome::Exited {
            code: Some(code),
            success: code == 0,
            output: output.to_string(),
        }
    }

    #[test]
    fn test_success_requires_artifact() {
        let run = exited(
            0,
            "Success. Downloaded item 100 to \"/root/steamapps/workshop/content/294100/100\"",
        );
        assert_eq!(classify(&run, true, 1), InstallOutcome::Succeeded);

        match classify(&run, false, 1) {
            InstallOutcome::FailedPermanent { attempts, .. } => assert_eq!(attempts, 1),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_rate_limit_is_transient() {
        let run = exited(1, "Loading Steam API...OK\nrate limited");
        assert_eq!(
            classify(&run, false, 1),
            InstallOutcome::FailedTransient {
                reason: "rate limited".to_string()
            }
        );
    }

    #[test]
    fn test_steamcmd_timeout_line_is_transient() {
        let run = exited(8, "ERROR! Timeout downloading item 100");
        assert_eq!(
            classify(&run, false, 2),
            InstallOutcome::FailedTransient {
                reason: "ERROR! Timeout downloading item 100".to_string()
            }
        );
    }

    #[test]
    fn test_generic_failure_is_permanent() {
        let run = exited(
            8,
            "Connecting anonymously to Steam Public...OK\n\
             ERROR! Download item 999 failed (Failure).\n",
        );
        assert_eq!(
            classify(&run, false, 3),
            InstallOutcome::FailedPermanent {
                reason: "ERROR! Download item 999 failed (Failure).".to_string(),
                attempts: 3,
            }
        );
    }

    #[test]
    fn test_progress_numbers_do_not_look_transient() {
        let run = exited(
            8,
            "[ 10%] Downloading update (1,503 of 39,000 KB)...\n\
             Network configuration loaded\n\
             ERROR! Download item 999 failed (Failure).",
        );
        assert_eq!(
            classify(&run, false, 1),
            InstallOutcome::FailedPermanent {
                reason: "ERROR! Download item 999 failed (Failure).".to_string(),
                attempts: 1,
            }
        );
    }

    #[test]
    fn test_http_status_codes_are_transient() {
        for output in [
            "ERROR! Download item 100 failed (HTTP 503)",
            "ERROR! Download item 100 failed (429)",
            "ERROR! Download item 100 failed: Service Unavailable",
        ] {
            let outcome = classify(&exited(8, output), false, 1);
            assert!(
                matches!(outcome, InstallOutcome::FailedTransient { .. }),
                "not transient: {}",
                output
            );
        }
    }

    #[test]
    fn test_process_timeout_is_transient() {
        let run = RunOutcome::TimedOut {
            output: String::new(),
        };
        assert!(matches!(
            classify(&run, false, 1),
            InstallOutcome::FailedTransient { .. }
        ));
    }

    #[test]
    fn test_up_to_date_is_success() {
        let run = exited(0, "Item 100 is already up to date");
        assert_eq!(classify(&run, false, 1), InstallOutcome::Succeeded);
    }

    #[test]
    fn test_silent_failure_uses_exit_code() {
        assert_eq!(
            classify(&exited(5, ""), false, 1),
            InstallOutcome::FailedPermanent {
                reason: "SteamCMD exited with code 5".to_string(),
                attempts: 1,
            }
        );
    }

    #[test]
    fn test_extract_reason() {
        assert_eq!(extract_reason("a\nb\n\n"), Some("b".to_string()));
        assert_eq!(
            extract_reason("ERROR! first\nsomething\nmore"),
            Some("ERROR! first".to_string())
        );
        assert_eq!(extract_reason("  \n"), None);

        let long = "x".repeat(MAX_REASON_CHARS + 50);
        let reason = extract_reason(&long).unwrap();
        assert!(reason.ends_with("..."));
        assert_eq!(reason.chars().count(), MAX_REASON_CHARS + 3);
    }
}
