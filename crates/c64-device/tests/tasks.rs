//! Background task lifecycle and persistence.

mod common;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use c64_codec::ByteBuffer;
use c64_device::{
    BackendKind, Device, ErrorKind, TaskOperation, TaskRunner, TaskStatus, TaskStore,
};
use common::{FakeBackend, wait_until};

fn runner() -> (FakeBackend, TaskRunner) {
    let fake = FakeBackend::new(BackendKind::Emulator);
    let device = Arc::new(Device::new(fake.clone()));
    (fake, TaskRunner::new(device))
}

fn border() -> TaskOperation {
    TaskOperation::ReadMemory {
        address: 0xD020,
        length: 1,
    }
}

fn temp_store(label: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    std::env::temp_dir()
        .join(format!("c64-device-test-{label}-{}-{nanos}", std::process::id()))
        .join("tasks.json")
}

fn settled(runner: &TaskRunner, name: &str) -> bool {
    wait_until(|| {
        runner
            .get(name)
            .is_some_and(|record| record.status != TaskStatus::Running)
    })
}

#[test]
fn task_completes_after_max_iterations() {
    let (fake, runner) = runner();

    let record = runner
        .start("border", border(), Duration::from_millis(5), Some(3))
        .expect("start");
    assert_eq!(record.status, TaskStatus::Running);
    assert_eq!(record.interval_ms, 5);

    assert!(settled(&runner, "border"));
    let record = runner.get("border").expect("record");
    assert_eq!(record.status, TaskStatus::Completed);
    assert_eq!(record.iterations_run, 3);
    assert_eq!(record.last_error, None);
    assert_eq!(fake.count("read $D020+1"), 3);
}

#[test]
fn failing_operation_marks_the_task_failed() {
    let (fake, runner) = runner();
    fake.state().fail_reads = true;

    runner
        .start("flaky", border(), Duration::from_millis(5), None)
        .expect("start");

    assert!(settled(&runner, "flaky"));
    let record = runner.get("flaky").expect("record");
    assert_eq!(record.status, TaskStatus::Failed);
    assert_eq!(record.iterations_run, 0);
    assert!(
        record
            .last_error
            .as_deref()
            .is_some_and(|e| e.contains("link down")),
        "{record:?}"
    );
}

#[test]
fn stop_is_idempotent() {
    let (fake, runner) = runner();
    runner
        .start("ping", TaskOperation::Ping, Duration::from_millis(10), None)
        .expect("start");
    assert!(wait_until(|| fake.count("ping") >= 1));

    assert!(runner.stop("ping"));
    let record = runner.get("ping").expect("record");
    assert_eq!(record.status, TaskStatus::Stopped);

    let pings = fake.count("ping");
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(fake.count("ping"), pings, "worker kept running after stop");

    assert!(!runner.stop("ping"));
    assert!(!runner.stop("never-started"));
    assert_eq!(runner.get("ping").expect("record").status, TaskStatus::Stopped);
}

#[test]
fn stop_all_stops_every_running_task() {
    let (fake, runner) = runner();
    runner
        .start("done", border(), Duration::from_millis(5), Some(1))
        .expect("start");
    assert!(settled(&runner, "done"));
    for name in ["a", "b", "c"] {
        runner
            .start(name, TaskOperation::Ping, Duration::from_millis(10), None)
            .expect("start");
    }
    assert!(wait_until(|| fake.count("ping") >= 3));

    assert_eq!(runner.stop_all(), 3);
    for name in ["a", "b", "c"] {
        assert_eq!(runner.get(name).expect("record").status, TaskStatus::Stopped);
    }
    assert_eq!(runner.get("done").expect("record").status, TaskStatus::Completed);

    let calls = fake.calls().len();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(fake.calls().len(), calls, "workers kept running after stop_all");

    assert_eq!(runner.stop_all(), 0);
}

#[test]
fn duplicate_start_is_rejected_while_running() {
    let (_fake, runner) = runner();
    runner
        .start("watch", border(), Duration::from_millis(10), None)
        .expect("start");

    let err = runner
        .start("watch", TaskOperation::Info, Duration::from_millis(10), None)
        .expect_err("duplicate");
    assert_eq!(err.kind(), ErrorKind::Task);
    assert!(err.to_string().contains("already running"));

    runner.stop("watch");
    let record = runner
        .start("watch", TaskOperation::Info, Duration::from_millis(10), Some(1))
        .expect("restart after stop");
    assert_eq!(record.operation, TaskOperation::Info);
    assert!(settled(&runner, "watch"));
}

#[test]
fn bad_arguments_are_rejected_before_spawning() {
    let (fake, runner) = runner();

    for (name, interval, max) in [
        ("", Duration::from_millis(10), None),
        ("zero", Duration::ZERO, None),
        ("none", Duration::from_millis(10), Some(0)),
    ] {
        let err = runner
            .start(name, border(), interval, max)
            .expect_err("rejected");
        assert_eq!(err.kind(), ErrorKind::Task);
    }
    assert!(runner.list().is_empty());
    assert!(fake.calls().is_empty());
}

#[test]
fn unsupported_operation_is_rejected_at_start() {
    let fake = FakeBackend::new(BackendKind::Hardware);
    let runner = TaskRunner::new(Arc::new(Device::new(fake.clone())));

    let err = runner
        .start("ping", TaskOperation::Ping, Duration::from_millis(10), None)
        .expect_err("hardware has no ping");
    assert_eq!(err.kind(), ErrorKind::Unsupported);
    assert!(runner.get("ping").is_none());
}

#[test]
fn write_task_writes_each_iteration() {
    let (fake, runner) = runner();
    let operation = TaskOperation::WriteMemory {
        address: 0xD021,
        data: ByteBuffer::from([0x06]),
    };

    runner
        .start("bg", operation, Duration::from_millis(5), Some(2))
        .expect("start");

    assert!(settled(&runner, "bg"));
    assert_eq!(fake.count("write $D021+1"), 2);
    assert_eq!(fake.peek(0xD021, 1), vec![0x06]);
}

#[test]
fn records_survive_a_new_runner() {
    let path = temp_store("persist");
    let store = TaskStore::new(&path);

    {
        let fake = FakeBackend::new(BackendKind::Emulator);
        let runner = TaskRunner::with_store(Arc::new(Device::new(fake)), store.clone())
            .expect("empty store");
        runner
            .start("done", border(), Duration::from_millis(5), Some(2))
            .expect("start");
        assert!(settled(&runner, "done"));
        runner
            .start("left", TaskOperation::ReadScreen, Duration::from_millis(20), None)
            .expect("start");
    }

    let stored = store.load().expect("load");
    assert_eq!(stored.len(), 2);
    assert_eq!(stored["done"].status, TaskStatus::Completed);
    assert_eq!(stored["done"].iterations_run, 2);
    assert_eq!(stored["left"].status, TaskStatus::Stopped);

    let fake = FakeBackend::new(BackendKind::Emulator);
    let runner =
        TaskRunner::with_store(Arc::new(Device::new(fake.clone())), store).expect("reload");
    let names: Vec<String> = runner.list().into_iter().map(|r| r.name).collect();
    assert_eq!(names, vec!["done", "left"]);
    assert!(fake.calls().is_empty(), "stored tasks must not restart");

    let _ = std::fs::remove_dir_all(path.parent().expect("temp dir"));
}

#[test]
fn missing_store_file_is_empty() {
    let store = TaskStore::new(temp_store("missing"));
    assert!(store.load().expect("load").is_empty());
}
