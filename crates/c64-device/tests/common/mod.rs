//! In-memory backend shared by the facade integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use c64_codec::{ByteBuffer, Prg};
use c64_device::{ActionOutcome, Backend, BackendKind, DeviceError};
use serde_json::{Value as JsonValue, json};
use vice_monitor::{Command, MonitorClient, MonitorError, Request, Response};

#[derive(Default)]
pub struct FakeState {
    pub memory: Vec<u8>,
    /// One entry per backend call, e.g. `pause`, `read $0400+2`.
    pub calls: Vec<String>,
    /// How many upcoming pause calls fail.
    pub pause_failures: usize,
    /// Writes land with every bit flipped.
    pub corrupt_writes: bool,
    pub fail_reads: bool,
    pub pause_delay: Duration,
}

/// A 64 KiB machine that logs every call.
#[derive(Clone)]
pub struct FakeBackend {
    kind: BackendKind,
    state: Arc<Mutex<FakeState>>,
}

impl FakeBackend {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            state: Arc::new(Mutex::new(FakeState {
                memory: vec![0; 0x10000],
                ..FakeState::default()
            })),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake state")
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.state().calls.iter().filter(|c| c.as_str() == call).count()
    }

    pub fn poke(&self, address: u16, data: &[u8]) {
        let start = usize::from(address);
        self.state().memory[start..start + data.len()].copy_from_slice(data);
    }

    pub fn peek(&self, address: u16, length: usize) -> Vec<u8> {
        let start = usize::from(address);
        self.state().memory[start..start + length].to_vec()
    }

    fn log(&self, call: String) {
        self.state().calls.push(call);
    }
}

impl Backend for FakeBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn endpoint(&self) -> String {
        "fake:0".to_string()
    }

    fn info(&self) -> Result<JsonValue, DeviceError> {
        self.log("info".to_string());
        Ok(json!({ "backend": self.kind }))
    }

    fn read_memory(&self, address: u16, length: usize) -> Result<ByteBuffer, DeviceError> {
        self.log(format!("read ${address:04X}+{length}"));
        if self.state().fail_reads {
            return Err(MonitorError::Connection("link down".to_string()).into());
        }
        Ok(ByteBuffer::from(self.peek(address, length)))
    }

    fn write_memory(&self, address: u16, data: &[u8]) -> Result<(), DeviceError> {
        self.log(format!("write ${address:04X}+{}", data.len()));
        let stored: Vec<u8> = if self.state().corrupt_writes {
            data.iter().map(|b| !b).collect()
        } else {
            data.to_vec()
        };
        self.poke(address, &stored);
        Ok(())
    }

    fn run_program(&self, prg: &Prg) -> Result<(), DeviceError> {
        self.log(format!("run ${:04X}", prg.load_address));
        Ok(())
    }

    fn reset(&self) -> Result<ActionOutcome, DeviceError> {
        self.log("reset".to_string());
        Ok(ActionOutcome::ok())
    }

    fn pause(&self) -> Result<ActionOutcome, DeviceError> {
        self.log("pause".to_string());
        let delay = self.state().pause_delay;
        thread::sleep(delay);
        let mut state = self.state();
        if state.pause_failures > 0 {
            state.pause_failures -= 1;
            return Err(MonitorError::Connection("pause refused".to_string()).into());
        }
        Ok(ActionOutcome::ok())
    }

    fn resume(&self) -> Result<ActionOutcome, DeviceError> {
        self.log("resume".to_string());
        Ok(ActionOutcome::ok())
    }

    fn ping(&self) -> Result<(), DeviceError> {
        self.log("ping".to_string());
        Ok(())
    }
}

/// Poll `condition` until it holds or two seconds pass.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// A loopback VICE monitor with 64 KiB of RAM that answers every command.
/// Commands listed in `refusals` get the paired error code instead.
pub struct FakeMonitor {
    pub port: u16,
    requests: Arc<Mutex<Vec<Request>>>,
    memory: Arc<Mutex<Vec<u8>>>,
    handle: JoinHandle<()>,
}

impl FakeMonitor {
    pub fn spawn(refusals: &[(Command, u8)]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake monitor");
        let port = listener.local_addr().expect("local addr").port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let memory = Arc::new(Mutex::new(vec![0u8; 0x10000]));
        let refusals: HashMap<u8, u8> = refusals
            .iter()
            .map(|(command, code)| (command.id(), *code))
            .collect();

        let handle = thread::spawn({
            let requests = Arc::clone(&requests);
            let memory = Arc::clone(&memory);
            move || {
                let (mut stream, _) = listener.accept().expect("accept");
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                loop {
                    match stream.read(&mut chunk) {
                        Ok(0) | Err(_) => return,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                    while let Some((request, used)) =
                        Request::decode(&buf).expect("client sent a valid frame")
                    {
                        buf.drain(..used);
                        let (error_code, body) = match refusals.get(&request.command) {
                            Some(&code) => (code, Vec::new()),
                            None => (0, answer(&request, &mut memory.lock().expect("memory"))),
                        };
                        let response = Response {
                            response_type: request.command,
                            error_code,
                            request_id: request.request_id,
                            body,
                        };
                        requests.lock().expect("requests").push(request);
                        if stream.write_all(&response.encode()).is_err() {
                            return;
                        }
                    }
                }
            }
        });

        Self {
            port,
            requests,
            memory,
            handle,
        }
    }

    pub fn connect(&self) -> MonitorClient {
        MonitorClient::connect_with_timeout("127.0.0.1", self.port, Duration::from_secs(2))
            .expect("connect to fake monitor")
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().expect("requests").clone()
    }

    /// Command ids received so far, in order.
    pub fn commands(&self) -> Vec<u8> {
        self.requests().iter().map(|r| r.command).collect()
    }

    pub fn peek(&self, address: u16, length: usize) -> Vec<u8> {
        let start = usize::from(address);
        self.memory.lock().expect("memory")[start..start + length].to_vec()
    }

    /// Wait for the client to hang up.
    pub fn join(self) {
        self.handle.join().expect("fake monitor thread");
    }
}

fn answer(request: &Request, memory: &mut [u8]) -> Vec<u8> {
    let span = |body: &[u8]| {
        let start = usize::from(u16::from_le_bytes([body[1], body[2]]));
        let end = usize::from(u16::from_le_bytes([body[3], body[4]]));
        start..=end
    };
    match Command::from_id(request.command) {
        Some(Command::Info) => vec![4, 3, 8, 0, 0, 4, 0x01, 0x00, 0x00, 0x00],
        Some(Command::MemoryGet) => {
            let range = span(&request.body);
            let data = &memory[range];
            let mut body = (data.len() as u16).to_le_bytes().to_vec();
            body.extend_from_slice(data);
            body
        }
        Some(Command::MemorySet) => {
            let range = span(&request.body);
            memory[range].copy_from_slice(&request.body[8..]);
            Vec::new()
        }
        _ => Vec::new(),
    }
}
