//! Outcome verdicts from scripted screen sequences.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use c64_device::{
    CancelToken, DeviceError, OutcomeStatus, OutcomeValidator, PollConfig, ProgramKind,
    ScreenReader,
};
use vice_monitor::MonitorError;

/// Plays back screens in order, then keeps showing the last one. `None`
/// entries fail the read.
struct ScriptedScreen {
    frames: Mutex<VecDeque<Option<&'static str>>>,
    last: Mutex<&'static str>,
    reads: Mutex<usize>,
}

impl ScriptedScreen {
    fn new(frames: &[Option<&'static str>]) -> Self {
        Self {
            frames: Mutex::new(frames.iter().copied().collect()),
            last: Mutex::new(""),
            reads: Mutex::new(0),
        }
    }

    fn showing(frames: &[&'static str]) -> Self {
        let frames: Vec<_> = frames.iter().copied().map(Some).collect();
        Self::new(&frames)
    }

    fn reads(&self) -> usize {
        *self.reads.lock().expect("lock")
    }
}

impl ScreenReader for ScriptedScreen {
    fn read_screen_text(&self) -> Result<String, DeviceError> {
        *self.reads.lock().expect("lock") += 1;
        let mut last = self.last.lock().expect("lock");
        match self.frames.lock().expect("lock").pop_front() {
            Some(Some(frame)) => *last = frame,
            Some(None) => {
                return Err(MonitorError::Connection("screen read dropped".into()).into());
            }
            None => {}
        }
        Ok((*last).to_string())
    }
}

fn fast() -> PollConfig {
    PollConfig::new(Duration::from_millis(300), Duration::from_millis(5))
}

#[test]
fn machine_code_that_never_changes_the_screen_crashed() {
    let screen = ScriptedScreen::showing(&["READY.\nSYS 49152"]);

    let outcome = OutcomeValidator::new(fast()).validate(&screen, ProgramKind::Asm);

    assert_eq!(outcome.status, OutcomeStatus::Crashed);
    assert_eq!(outcome.program_kind, ProgramKind::Asm);
    assert_eq!(outcome.message.as_deref(), Some("no screen change detected"));
    assert!(outcome.elapsed_ms >= 300);
    assert!(screen.reads() > 2);
}

#[test]
fn machine_code_that_draws_is_ok() {
    let screen = ScriptedScreen::showing(&[
        "READY.\nSYS 49152",
        "READY.\nSYS 49152",
        "READY.\nSYS 49152\nHELLO WORLD",
    ]);

    let outcome = OutcomeValidator::new(fast()).validate(&screen, ProgramKind::Asm);

    assert_eq!(outcome.status, OutcomeStatus::Ok);
    assert_eq!(outcome.message, None);
    assert!(outcome.elapsed_ms < 300);
}

#[test]
fn machine_code_that_clears_the_screen_first_is_ok() {
    let screen = ScriptedScreen::showing(&["", "    "]);

    let outcome = OutcomeValidator::new(fast()).validate(&screen, ProgramKind::Asm);

    assert_eq!(outcome.status, OutcomeStatus::Ok);
    assert_eq!(
        outcome.message.as_deref(),
        Some("launch command never observed")
    );
}

#[test]
fn basic_syntax_error_reports_message_and_line() {
    let screen = ScriptedScreen::showing(&[
        "READY.",
        "READY.\nRUN",
        "READY.\nRUN\n?SYNTAX  ERROR IN 10\nREADY.",
    ]);

    let outcome = OutcomeValidator::new(fast()).validate(&screen, ProgramKind::Basic);

    assert_eq!(outcome.status, OutcomeStatus::Error);
    assert_eq!(outcome.program_kind, ProgramKind::Basic);
    assert_eq!(outcome.message.as_deref(), Some("SYNTAX"));
    assert_eq!(outcome.line, Some(10));
}

#[test]
fn basic_ready_before_run_is_not_mistaken_for_completion() {
    // The READY. above the echo belongs to the previous command.
    let screen = ScriptedScreen::showing(&[
        "READY.\nRUN",
        "READY.\nRUN\nHELLO",
        "READY.\nRUN\nHELLO\n\nREADY.",
    ]);

    let outcome = OutcomeValidator::new(fast()).validate(&screen, ProgramKind::Basic);

    assert_eq!(outcome.status, OutcomeStatus::Ok);
    assert_eq!(outcome.message, None);
    assert!(screen.reads() >= 3);
}

#[test]
fn basic_still_running_at_timeout_is_ok() {
    let screen = ScriptedScreen::showing(&["RUN", "RUN\nCOUNTING 1", "RUN\nCOUNTING 2"]);

    let outcome = OutcomeValidator::new(fast()).validate(&screen, ProgramKind::Basic);

    assert_eq!(outcome.status, OutcomeStatus::Ok);
    assert_eq!(outcome.message.as_deref(), Some("still running at timeout"));
}

#[test]
fn basic_echo_never_seen_is_ok() {
    let screen = ScriptedScreen::showing(&["HELLO"]);

    let outcome = OutcomeValidator::new(fast()).validate(&screen, ProgramKind::Basic);

    assert_eq!(outcome.status, OutcomeStatus::Ok);
    assert_eq!(
        outcome.message.as_deref(),
        Some("finished before RUN was observed")
    );
}

#[test]
fn failed_reads_are_skipped() {
    let screen = ScriptedScreen::new(&[
        None,
        Some("READY.\nRUN"),
        None,
        None,
        Some("RUN\n?DIVISION BY ZERO  ERROR IN 30\nREADY."),
    ]);

    let outcome = OutcomeValidator::new(fast()).validate(&screen, ProgramKind::Basic);

    assert_eq!(outcome.status, OutcomeStatus::Error);
    assert_eq!(outcome.message.as_deref(), Some("DIVISION BY ZERO"));
    assert_eq!(outcome.line, Some(30));
}

#[test]
fn every_read_failing_still_ends_within_the_budget() {
    let screen = ScriptedScreen::new(&[None; 200]);

    let started = Instant::now();
    let outcome = OutcomeValidator::new(fast()).validate(&screen, ProgramKind::Asm);

    assert_eq!(outcome.status, OutcomeStatus::Ok);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn cancellation_ends_polling_early() {
    let screen = ScriptedScreen::showing(&["SYS 2064"]);
    let cancel = CancelToken::new();
    cancel.cancel();

    let slow = PollConfig::new(Duration::from_secs(30), Duration::from_millis(250));
    let started = Instant::now();
    let outcome = OutcomeValidator::new(slow)
        .with_cancel(cancel)
        .validate(&screen, ProgramKind::Asm);

    assert_eq!(outcome.status, OutcomeStatus::Crashed);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(screen.reads(), 1);
}
