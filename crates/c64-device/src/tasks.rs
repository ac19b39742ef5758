//! Background tasks: one device operation repeated on a timer.
//!
//! Each task runs on its own thread until it reaches its iteration limit,
//! fails, or is stopped. Task records are kept in memory and, when a
//! [`TaskStore`] is attached, written to a JSON file after every change so
//! `list` still reports them after a restart. Tasks are never resumed
//! automatically.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use c64_codec::ByteBuffer;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{CancelToken, Capability, Device, DeviceError};

/// What a task does on each iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", content = "arguments", rename_all = "snake_case")]
pub enum TaskOperation {
    ReadMemory { address: u16, length: usize },
    WriteMemory { address: u16, data: ByteBuffer },
    ReadScreen,
    Info,
    Ping,
}

impl TaskOperation {
    #[must_use]
    pub const fn capability(&self) -> Capability {
        match self {
            Self::ReadMemory { .. } => Capability::ReadMemory,
            Self::WriteMemory { .. } => Capability::WriteMemory,
            Self::ReadScreen => Capability::ReadScreen,
            Self::Info => Capability::Info,
            Self::Ping => Capability::Ping,
        }
    }

    fn run(&self, device: &Device) -> Result<(), DeviceError> {
        match self {
            Self::ReadMemory { address, length } => {
                device.read_memory(*address, *length).map(drop)
            }
            Self::WriteMemory { address, data } => device.write_memory(*address, data),
            Self::ReadScreen => device.read_screen_text().map(drop),
            Self::Info => device.info().map(drop),
            Self::Ping => device.ping(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Completed,
    Stopped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub name: String,
    #[serde(flatten)]
    pub operation: TaskOperation,
    pub interval_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u64>,
    pub status: TaskStatus,
    #[serde(default)]
    pub iterations_run: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// JSON file of task records keyed by name.
#[derive(Debug, Clone)]
pub struct TaskStore {
    path: PathBuf,
}

impl TaskStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored records; a missing file is an empty store.
    pub fn load(&self) -> Result<BTreeMap<String, TaskRecord>, DeviceError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(DeviceError::io(&self.path, e)),
        };
        serde_json::from_str(&text).map_err(|e| {
            DeviceError::Config(format!("task store {}: {e}", self.path.display()))
        })
    }

    /// Replace the file's contents via a temporary file and rename.
    pub fn save(&self, records: &BTreeMap<String, TaskRecord>) -> Result<(), DeviceError> {
        let json = serde_json::to_vec_pretty(records)
            .map_err(|e| DeviceError::Config(format!("cannot encode task records: {e}")))?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| DeviceError::io(dir, e))?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json).map_err(|e| DeviceError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| DeviceError::io(&self.path, e))
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Records shared between the runner and its worker threads.
struct Shared {
    records: Mutex<BTreeMap<String, TaskRecord>>,
    store: Option<TaskStore>,
}

impl Shared {
    /// Apply `change` to the named record and persist if it reports a
    /// modification.
    fn update<T>(&self, name: &str, change: impl FnOnce(&mut TaskRecord) -> (bool, T)) -> Option<T> {
        let mut records = lock(&self.records);
        let record = records.get_mut(name)?;
        let (modified, value) = change(record);
        if modified {
            self.persist(&records);
        }
        Some(value)
    }

    fn persist(&self, records: &BTreeMap<String, TaskRecord>) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(records) {
                warn!("cannot persist task records: {e}");
            }
        }
    }
}

struct Worker {
    cancel: CancelToken,
    handle: JoinHandle<()>,
}

pub struct TaskRunner {
    device: Arc<Device>,
    shared: Arc<Shared>,
    workers: Mutex<HashMap<String, Worker>>,
}

impl TaskRunner {
    /// Runner with in-memory records only.
    #[must_use]
    pub fn new(device: Arc<Device>) -> Self {
        Self::build(device, BTreeMap::new(), None)
    }

    /// Runner backed by `store`. Records from an earlier process are
    /// listed with their last known status but not restarted.
    pub fn with_store(device: Arc<Device>, store: TaskStore) -> Result<Self, DeviceError> {
        let records = store.load()?;
        debug!("loaded {} task records from {}", records.len(), store.path().display());
        Ok(Self::build(device, records, Some(store)))
    }

    fn build(
        device: Arc<Device>,
        records: BTreeMap<String, TaskRecord>,
        store: Option<TaskStore>,
    ) -> Self {
        Self {
            device,
            shared: Arc::new(Shared {
                records: Mutex::new(records),
                store,
            }),
            workers: Mutex::default(),
        }
    }

    /// Start repeating `operation` every `interval`. Fails if a task with
    /// this name is still running.
    pub fn start(
        &self,
        name: &str,
        operation: TaskOperation,
        interval: Duration,
        max_iterations: Option<u64>,
    ) -> Result<TaskRecord, DeviceError> {
        let task_error = |reason: &str| DeviceError::Task {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        if name.trim().is_empty() {
            return Err(task_error("name must not be empty"));
        }
        if interval.is_zero() {
            return Err(task_error("interval must be positive"));
        }
        if max_iterations == Some(0) {
            return Err(task_error("max_iterations must be positive"));
        }
        let capability = operation.capability();
        if !self.device.supports(capability) {
            return Err(DeviceError::Unsupported {
                operation: capability,
                backend: self.device.kind(),
            });
        }

        let mut workers = lock(&self.workers);
        if workers.get(name).is_some_and(|w| !w.handle.is_finished()) {
            return Err(task_error("already running"));
        }
        if let Some(finished) = workers.remove(name) {
            let _ = finished.handle.join();
        }

        let record = TaskRecord {
            name: name.to_string(),
            operation: operation.clone(),
            interval_ms: interval.as_millis() as u64,
            max_iterations,
            status: TaskStatus::Running,
            iterations_run: 0,
            last_error: None,
        };
        {
            let mut records = lock(&self.shared.records);
            records.insert(name.to_string(), record.clone());
            self.shared.persist(&records);
        }

        let cancel = CancelToken::new();
        let job = Job {
            name: name.to_string(),
            operation,
            interval,
            max_iterations,
            device: Arc::clone(&self.device),
            shared: Arc::clone(&self.shared),
            cancel: cancel.clone(),
        };
        let handle = thread::Builder::new()
            .name(format!("task-{name}"))
            .spawn(move || job.run())
            .map_err(|e| task_error(&format!("cannot spawn worker: {e}")))?;
        workers.insert(name.to_string(), Worker { cancel, handle });

        info!("task {name} started ({record:?})");
        Ok(record)
    }

    /// Stop a running task. Returns whether anything changed; stopping a
    /// task that is not running is a no-op.
    pub fn stop(&self, name: &str) -> bool {
        let changed = self
            .shared
            .update(name, |record| {
                let running = record.status == TaskStatus::Running;
                if running {
                    record.status = TaskStatus::Stopped;
                }
                (running, running)
            })
            .unwrap_or(false);

        let worker = lock(&self.workers).remove(name);
        if let Some(worker) = worker {
            worker.cancel.cancel();
            if worker.handle.thread().id() != thread::current().id() {
                let _ = worker.handle.join();
            }
        }
        if changed {
            info!("task {name} stopped");
        }
        changed
    }

    /// Stop every running task; returns how many were stopped.
    pub fn stop_all(&self) -> usize {
        let mut names: Vec<String> = lock(&self.workers).keys().cloned().collect();
        names.extend(
            lock(&self.shared.records)
                .values()
                .filter(|r| r.status == TaskStatus::Running)
                .map(|r| r.name.clone()),
        );
        names.sort();
        names.dedup();
        names.iter().filter(|name| self.stop(name)).count()
    }

    /// All known tasks, ordered by name.
    #[must_use]
    pub fn list(&self) -> Vec<TaskRecord> {
        lock(&self.shared.records).values().cloned().collect()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<TaskRecord> {
        lock(&self.shared.records).get(name).cloned()
    }
}

impl Drop for TaskRunner {
    fn drop(&mut self) {
        self.stop_all();
    }
}

/// Everything a worker thread owns.
struct Job {
    name: String,
    operation: TaskOperation,
    interval: Duration,
    max_iterations: Option<u64>,
    device: Arc<Device>,
    shared: Arc<Shared>,
    cancel: CancelToken,
}

impl Job {
    fn run(self) {
        let mut iterations = 0u64;
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            match self.operation.run(&self.device) {
                Ok(()) => {
                    iterations += 1;
                    let done = self.max_iterations.is_some_and(|max| iterations >= max);
                    self.shared.update(&self.name, |record| {
                        record.iterations_run = iterations;
                        if done && record.status == TaskStatus::Running {
                            record.status = TaskStatus::Completed;
                        }
                        (true, ())
                    });
                    if done {
                        info!("task {} completed after {iterations} iterations", self.name);
                        return;
                    }
                }
                Err(e) => {
                    warn!("task {} failed: {e}", self.name);
                    self.shared.update(&self.name, |record| {
                        let running = record.status == TaskStatus::Running;
                        if running {
                            record.status = TaskStatus::Failed;
                            record.last_error = Some(e.to_string());
                        }
                        (running, ())
                    });
                    return;
                }
            }
            if self.cancel.sleep(self.interval) {
                return;
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
