//! Screen location, rendering and run-and-validate through the facade.

mod common;

use std::time::Duration;

use c64_codec::screen::{SCREEN_COLS, ascii_to_screen_code};
use c64_codec::{Prg, SCREEN_SIZE};
use c64_device::{BackendKind, Device, OutcomeStatus, PollConfig, ProgramKind};
use common::FakeBackend;

fn put_text(fake: &FakeBackend, base: u16, row: usize, text: &str) {
    let codes: Vec<u8> = text
        .chars()
        .map(|c| ascii_to_screen_code(c).expect("printable"))
        .collect();
    fake.poke(base + (row * SCREEN_COLS) as u16, &codes);
}

fn blank(fake: &FakeBackend, base: u16) {
    fake.poke(base, &[0x20; SCREEN_SIZE]);
}

#[test]
fn default_video_setup_reads_0400() {
    let fake = FakeBackend::new(BackendKind::Emulator);
    // Power-on values: screen at $0400 in bank 0.
    fake.poke(0xD018, &[0x15]);
    fake.poke(0xDD00, &[0x97]);
    blank(&fake, 0x0400);
    put_text(&fake, 0x0400, 1, "READY.");
    let device = Device::new(fake.clone());

    let text = device.read_screen_text().expect("screen");
    let lines: Vec<&str> = text.split('\n').collect();
    assert_eq!(lines.len(), 25);
    assert_eq!(lines[0], "");
    assert_eq!(lines[1], "READY.");

    assert_eq!(device.find_screen_text("READY").expect("find"), Some((1, 0)));
    assert_eq!(device.find_screen_text("LOAD").expect("find"), None);
    assert!(fake.calls().contains(&"read $0400+1000".to_string()));
}

#[test]
fn relocated_screen_follows_the_vic_registers() {
    let fake = FakeBackend::new(BackendKind::Hardware);
    // Bank 1 ($4000), screen offset 2 * $0400.
    fake.poke(0xD018, &[0x25]);
    fake.poke(0xDD00, &[0x96]);
    blank(&fake, 0x4800);
    put_text(&fake, 0x4800, 0, "HI");
    let device = Device::new(fake.clone());

    let text = device.read_screen_text().expect("screen");
    assert!(text.starts_with("HI\n"));
    assert!(fake.calls().contains(&"read $4800+1000".to_string()));
}

#[test]
fn run_and_validate_detects_a_stuck_program() {
    let fake = FakeBackend::new(BackendKind::Emulator);
    fake.poke(0xD018, &[0x15]);
    fake.poke(0xDD00, &[0x97]);
    blank(&fake, 0x0400);
    put_text(&fake, 0x0400, 0, "READY.");
    put_text(&fake, 0x0400, 1, "SYS 49152");
    let device = Device::new(fake.clone());

    let prg = Prg::parse(&[0x00, 0xC0, 0x4C, 0x00, 0xC0]).expect("prg");
    let poll = PollConfig::new(Duration::from_millis(200), Duration::from_millis(10));
    let outcome = device
        .run_and_validate(&prg, None, poll)
        .expect("validated");

    assert_eq!(outcome.program_kind, ProgramKind::Asm);
    assert_eq!(outcome.status, OutcomeStatus::Crashed);
    assert_eq!(fake.calls()[0], "run $C000");
}
