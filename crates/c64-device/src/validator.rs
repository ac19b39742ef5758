//! Deciding whether a just-launched program worked.
//!
//! The machine never says "done", so the verdict comes from watching the
//! screen:
//!
//! - BASIC: wait for the `RUN` echo, then for either an error banner
//!   (`?SYNTAX  ERROR IN 10`) or the `READY.` prompt.
//! - Machine code: take the first screen showing the `RUN`/`SYS` echo as a
//!   baseline and wait for anything to change. A screen that never changes
//!   means the program is stuck.
//!
//! Screen reads that fail are logged and skipped. Every poll is bounded
//! by [`PollConfig::max`] and can be cut short through a [`CancelToken`].

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use c64_codec::Prg;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{DeviceError, PollConfig};

/// Anything that can produce the current screen as text.
pub trait ScreenReader {
    fn read_screen_text(&self) -> Result<String, DeviceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgramKind {
    #[serde(rename = "BASIC")]
    Basic,
    #[serde(rename = "ASM")]
    Asm,
}

impl ProgramKind {
    /// BASIC if the image loads at the start of BASIC text.
    #[must_use]
    pub fn of(prg: &Prg) -> Self {
        if prg.is_basic() { Self::Basic } else { Self::Asm }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Ok,
    Error,
    Crashed,
}

/// Final verdict of one validation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    pub status: OutcomeStatus,
    pub program_kind: ProgramKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub elapsed_ms: u64,
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Shared stop flag with an interruptible sleep.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (flag, wake) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        wake.notify_all();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for `duration` or until cancelled. Returns `true` if cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let (flag, wake) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = wake
            .wait_timeout_while(guard, duration, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    /// Launch command not seen yet.
    AwaitingEcho,
    /// BASIC program running.
    Running,
    /// Machine code running; compare against this screen.
    Watching { baseline: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Verdict {
    status: OutcomeStatus,
    message: Option<String>,
    line: Option<u32>,
}

impl Verdict {
    fn ok(message: Option<&str>) -> Self {
        Self {
            status: OutcomeStatus::Ok,
            message: message.map(str::to_string),
            line: None,
        }
    }
}

pub struct OutcomeValidator {
    poll: PollConfig,
    cancel: CancelToken,
}

impl OutcomeValidator {
    #[must_use]
    pub fn new(poll: PollConfig) -> Self {
        Self {
            poll,
            cancel: CancelToken::new(),
        }
    }

    /// Stop polling early when `cancel` fires. The verdict is then the one
    /// an expired budget would give.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn poll(&self) -> PollConfig {
        self.poll
    }

    pub fn validate(&self, screen: &dyn ScreenReader, kind: ProgramKind) -> ExecutionOutcome {
        let start = Instant::now();
        let mut phase = Phase::AwaitingEcho;
        let mut probes = 0u32;

        let verdict = loop {
            match screen.read_screen_text() {
                Ok(text) => {
                    probes += 1;
                    if let Some(verdict) = step(kind, &mut phase, &text) {
                        break verdict;
                    }
                }
                Err(e) => warn!("screen read failed, still polling: {e}"),
            }

            let elapsed = start.elapsed();
            if elapsed >= self.poll.max {
                break expired(kind, &phase);
            }
            if self.cancel.sleep(self.poll.interval.min(self.poll.max - elapsed)) {
                debug!("validation cancelled after {probes} probes");
                break expired(kind, &phase);
            }
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        debug!(
            "{kind:?} verdict {:?} after {probes} probes in {elapsed_ms} ms",
            verdict.status
        );
        ExecutionOutcome {
            status: verdict.status,
            program_kind: kind,
            message: verdict.message,
            line: verdict.line,
            elapsed_ms,
        }
    }
}

/// Advance on one screen observation.
fn step(kind: ProgramKind, phase: &mut Phase, text: &str) -> Option<Verdict> {
    match kind {
        ProgramKind::Basic => {
            if *phase == Phase::AwaitingEcho {
                let after = after_echo(text, &["RUN"])?;
                *phase = Phase::Running;
                return basic_result(after);
            }
            basic_result(after_echo(text, &["RUN"]).unwrap_or(text))
        }
        ProgramKind::Asm => match &*phase {
            Phase::Watching { baseline } => (text != baseline.as_str()).then(|| Verdict::ok(None)),
            _ => {
                after_echo(text, &["RUN", "SYS"])?;
                *phase = Phase::Watching {
                    baseline: text.to_string(),
                };
                None
            }
        },
    }
}

/// Verdict when the budget runs out in `phase`.
fn expired(kind: ProgramKind, phase: &Phase) -> Verdict {
    match (kind, phase) {
        (ProgramKind::Basic, Phase::AwaitingEcho) => {
            Verdict::ok(Some("finished before RUN was observed"))
        }
        (ProgramKind::Basic, _) => Verdict::ok(Some("still running at timeout")),
        (ProgramKind::Asm, Phase::Watching { .. }) => Verdict {
            status: OutcomeStatus::Crashed,
            message: Some("no screen change detected".to_string()),
            line: None,
        },
        (ProgramKind::Asm, _) => Verdict::ok(Some("launch command never observed")),
    }
}

fn basic_result(text: &str) -> Option<Verdict> {
    if let Some((message, line)) = error_banner(text) {
        return Some(Verdict {
            status: OutcomeStatus::Error,
            message: Some(message),
            line,
        });
    }
    text.lines()
        .any(|line| line.trim() == "READY.")
        .then(|| Verdict::ok(None))
}

/// Text following the last line that starts with one of `commands`.
fn after_echo<'a>(text: &'a str, commands: &[&str]) -> Option<&'a str> {
    let mut offset = 0;
    let mut found = None;
    for line in text.split('\n') {
        let end = offset + line.len();
        let word: String = line
            .trim_start()
            .chars()
            .take_while(char::is_ascii_alphabetic)
            .collect();
        if commands.contains(&word.as_str()) {
            found = Some((end + 1).min(text.len()));
        }
        offset = end + 1;
    }
    found.map(|start| &text[start..])
}

/// `?SYNTAX  ERROR IN 10` → `("SYNTAX", Some(10))`.
fn error_banner(text: &str) -> Option<(String, Option<u32>)> {
    text.lines().find_map(|line| {
        let body = line.trim().strip_prefix('?')?;
        let at = body.find("ERROR")?;
        let message = body[..at].trim().to_string();
        let line_number = body[at + "ERROR".len()..]
            .trim()
            .strip_prefix("IN")
            .and_then(|rest| rest.trim().parse().ok());
        Some((message, line_number))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banner_parsing() {
        assert_eq!(
            error_banner("?SYNTAX  ERROR IN 10\nREADY."),
            Some(("SYNTAX".to_string(), Some(10)))
        );
        assert_eq!(
            error_banner("?OUT OF MEMORY ERROR"),
            Some(("OUT OF MEMORY".to_string(), None))
        );
        assert_eq!(error_banner("READY."), None);
    }

    #[test]
    fn echo_splitting() {
        let text = "READY.\nRUN\nHELLO";
        assert_eq!(after_echo(text, &["RUN"]), Some("HELLO"));
        assert_eq!(after_echo("READY.\nRUN", &["RUN"]), Some(""));
        assert_eq!(after_echo("RUNNING MAN", &["RUN"]), None);
        assert_eq!(after_echo("SYS2061", &["RUN", "SYS"]), Some(""));
    }

    #[test]
    fn basic_steps() {
        let mut phase = Phase::AwaitingEcho;
        assert_eq!(step(ProgramKind::Basic, &mut phase, "READY."), None);
        assert_eq!(step(ProgramKind::Basic, &mut phase, "READY.\nRUN"), None);
        assert_eq!(phase, Phase::Running);
        let verdict = step(ProgramKind::Basic, &mut phase, "HELLO\nREADY.").expect("done");
        assert_eq!(verdict.status, OutcomeStatus::Ok);
    }

    #[test]
    fn cancel_interrupts_sleep() {
        let token = CancelToken::new();
        let other = token.clone();
        let handle = std::thread::spawn(move || other.sleep(Duration::from_secs(30)));
        token.cancel();
        assert!(handle.join().expect("sleeper"));
        assert!(token.is_cancelled());
        assert!(token.sleep(Duration::from_secs(30)));
    }

    #[test]
    fn outcome_json_shape() {
        let outcome = ExecutionOutcome {
            status: OutcomeStatus::Error,
            program_kind: ProgramKind::Basic,
            message: Some("SYNTAX".into()),
            line: Some(10),
            elapsed_ms: 120,
        };
        assert_eq!(
            serde_json::to_value(&outcome).expect("json"),
            serde_json::json!({
                "status": "error",
                "programKind": "BASIC",
                "message": "SYNTAX",
                "line": 10,
                "elapsedMs": 120
            })
        );
    }
}
