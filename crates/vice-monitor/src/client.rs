//! Connection handling and request/response correlation.

use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use c64_codec::ByteBuffer;
use log::{debug, error, warn};

use crate::command::memory_range;
use crate::frame::EVENT_REQUEST_ID;
use crate::{Command, Event, EventKind, FrameDecoder, MonitorError, Request, Response, to_petscii};

/// Port VICE listens on with `-binarymonitor`.
pub const DEFAULT_PORT: u16 = 6502;
/// Per-request response budget.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
/// Largest memory transfer sent in one frame.
const MAX_TRANSFER: usize = 0x8000;
/// Keyboard feed text length is a single byte.
const MAX_FEED: usize = 255;

type Reply = Result<Response, MonitorError>;
type Observer = Box<dyn Fn(&Event) + Send + Sync>;

/// Emulator identification from the info command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorInfo {
    /// Dotted version, e.g. `3.7.1.0`.
    pub version: String,
    pub svn_revision: u32,
}

/// State shared between callers and the reader thread.
struct Shared {
    writer: Mutex<TcpStream>,
    /// Separate handle so shutdown never waits behind a blocked write.
    control: TcpStream,
    pending: Mutex<HashMap<u32, SyncSender<Reply>>>,
    observers: Mutex<Vec<Observer>>,
    next_id: AtomicU32,
    open: AtomicBool,
}

impl Shared {
    /// Allocate a request id and park the completion handle under it.
    fn register(&self, sender: SyncSender<Reply>) -> Result<u32, MonitorError> {
        let mut pending = lock(&self.pending);
        if !self.open.load(Ordering::Acquire) {
            return Err(MonitorError::Closed);
        }
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id == EVENT_REQUEST_ID || pending.contains_key(&id) {
                continue;
            }
            pending.insert(id, sender);
            return Ok(id);
        }
    }

    fn dispatch(&self, frame: Response) {
        if frame.is_event() {
            let event = Event {
                kind: EventKind::from_type(frame.response_type),
                body: frame.body,
            };
            debug!("<- event {:?} pc={:?}", event.kind, event.pc());
            for observer in lock(&self.observers).iter() {
                observer(&event);
            }
            return;
        }

        let request_id = frame.request_id;
        let waiting = lock(&self.pending).remove(&request_id);
        match waiting {
            Some(sender) => {
                debug!(
                    "<- #{request_id} type={:#04X} error={:#04X} ({} bytes)",
                    frame.response_type,
                    frame.error_code,
                    frame.body.len()
                );
                // Capacity 1 and a single send per id: never blocks.
                let _ = sender.try_send(Ok(frame));
            }
            None => warn!("dropping response #{request_id}: no request is waiting for it"),
        }
    }

    /// Close the socket and fail everything still in flight. Idempotent.
    fn shutdown(&self, reason: &MonitorError) {
        let drained: Vec<SyncSender<Reply>> = {
            let mut pending = lock(&self.pending);
            self.open.store(false, Ordering::Release);
            pending.drain().map(|(_, sender)| sender).collect()
        };
        let _ = self.control.shutdown(Shutdown::Both);
        for sender in drained {
            let _ = sender.try_send(Err(reason.clone()));
        }
    }
}

/// A connection to the VICE binary monitor.
///
/// Safe to share between threads: requests from different callers are
/// interleaved on the one socket and matched back by request id.
pub struct MonitorClient {
    shared: Arc<Shared>,
    reader: Mutex<Option<JoinHandle<()>>>,
    timeout: Duration,
    peer: String,
}

impl MonitorClient {
    /// Connect with the default request timeout.
    pub fn connect(host: &str, port: u16) -> Result<Self, MonitorError> {
        Self::connect_with_timeout(host, port, DEFAULT_TIMEOUT)
    }

    pub fn connect_with_timeout(
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Self, MonitorError> {
        let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
        let mut last_error = None;
        let stream = addrs
            .iter()
            .find_map(|addr| match TcpStream::connect_timeout(addr, CONNECT_TIMEOUT) {
                Ok(stream) => Some(stream),
                Err(e) => {
                    last_error = Some(e);
                    None
                }
            })
            .ok_or_else(|| match last_error {
                Some(e) => MonitorError::Connection(format!("{host}:{port}: {e}")),
                None => MonitorError::Connection(format!("{host}:{port}: no addresses resolved")),
            })?;
        stream.set_nodelay(true)?;

        let read_half = stream.try_clone()?;
        let control = stream.try_clone()?;
        let shared = Arc::new(Shared {
            writer: Mutex::new(stream),
            control,
            pending: Mutex::new(HashMap::new()),
            observers: Mutex::new(Vec::new()),
            next_id: AtomicU32::new(1),
            open: AtomicBool::new(true),
        });

        let reader = thread::Builder::new()
            .name("vice-monitor-reader".to_string())
            .spawn({
                let shared = Arc::clone(&shared);
                move || read_loop(&shared, read_half)
            })?;

        let peer = format!("{host}:{port}");
        debug!("connected to VICE monitor at {peer}");
        Ok(Self {
            shared,
            reader: Mutex::new(Some(reader)),
            timeout,
            peer,
        })
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn peer(&self) -> &str {
        &self.peer
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::Acquire)
    }

    /// Register a callback for unsolicited events (stopped, JAM, resumed).
    ///
    /// Observers run on the reader thread and must not call back into
    /// `add_observer`.
    pub fn add_observer<F>(&self, observer: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        lock(&self.shared.observers).push(Box::new(observer));
    }

    /// Send one command and wait for its correlated response.
    ///
    /// A non-zero error code in the reply becomes [`MonitorError::Command`].
    pub fn request(&self, command: Command, body: Vec<u8>) -> Result<Response, MonitorError> {
        let (sender, receiver) = mpsc::sync_channel(1);
        let request_id = self.shared.register(sender)?;
        let frame = Request::new(request_id, command, body).encode();
        debug!("-> {command} #{request_id} ({} bytes)", frame.len());

        let written = lock(&self.shared.writer).write_all(&frame);
        if let Err(e) = written {
            let err = MonitorError::from(e);
            error!("write to {} failed: {err}", self.peer);
            self.shared.shutdown(&err);
            return Err(err);
        }

        match receiver.recv_timeout(self.timeout) {
            Ok(Ok(response)) if response.error_code != 0 => Err(MonitorError::Command {
                command,
                code: response.error_code,
            }),
            // Out of step with the request ids: drop the connection.
            Ok(Ok(response)) if response.response_type != command.id() => {
                let err = MonitorError::Protocol(format!(
                    "{command} #{request_id} answered with response type {:#04X}",
                    response.response_type
                ));
                error!("{}: {err}", self.peer);
                self.shared.shutdown(&err);
                Err(err)
            }
            Ok(reply) => reply,
            Err(RecvTimeoutError::Timeout) => {
                lock(&self.shared.pending).remove(&request_id);
                warn!("{command} #{request_id} timed out after {:?}", self.timeout);
                Err(MonitorError::Timeout {
                    command,
                    request_id,
                    timeout: self.timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(MonitorError::Closed),
        }
    }

    pub fn ping(&self) -> Result<(), MonitorError> {
        self.request(Command::Ping, Vec::new()).map(drop)
    }

    pub fn info(&self) -> Result<MonitorInfo, MonitorError> {
        let response = self.request(Command::Info, Vec::new())?;
        parse_info(&response.body)
    }

    /// Soft or hard reset of the whole machine.
    pub fn reset(&self, hard: bool) -> Result<(), MonitorError> {
        self.request(Command::Reset, vec![u8::from(hard)]).map(drop)
    }

    /// Read `length` bytes from main CPU memory.
    pub fn memory_get(
        &self,
        address: u16,
        length: usize,
        bank: Option<u16>,
    ) -> Result<ByteBuffer, MonitorError> {
        check_range(address, length)?;
        let mut out = Vec::with_capacity(length);
        let mut start = usize::from(address);
        let end = start + length;

        while start < end {
            let chunk_end = (start + MAX_TRANSFER).min(end);
            let body = memory_range(start as u16, (chunk_end - 1) as u16, bank.unwrap_or(0));
            let response = self.request(Command::MemoryGet, body)?;
            out.extend_from_slice(memory_payload(&response.body, chunk_end - start)?);
            start = chunk_end;
        }

        Ok(ByteBuffer::new(out))
    }

    /// Write bytes into main CPU memory.
    pub fn memory_set(
        &self,
        address: u16,
        data: &[u8],
        bank: Option<u16>,
    ) -> Result<(), MonitorError> {
        check_range(address, data.len())?;
        let mut start = usize::from(address);

        for chunk in data.chunks(MAX_TRANSFER) {
            let end = start + chunk.len() - 1;
            let mut body = memory_range(start as u16, end as u16, bank.unwrap_or(0));
            body.extend_from_slice(chunk);
            self.request(Command::MemorySet, body)?;
            start = end + 1;
        }

        Ok(())
    }

    /// Type text into the keyboard buffer; the emulator turns each
    /// character into a key press and release.
    pub fn keyboard_feed(&self, text: &str) -> Result<(), MonitorError> {
        let petscii = to_petscii(text)?;
        for chunk in petscii.chunks(MAX_FEED) {
            let mut body = Vec::with_capacity(chunk.len() + 1);
            body.push(chunk.len() as u8);
            body.extend_from_slice(chunk);
            self.request(Command::KeyboardFeed, body)?;
        }
        Ok(())
    }

    /// Leave the monitor so the emulated CPU runs again.
    pub fn exit_monitor(&self) -> Result<(), MonitorError> {
        self.request(Command::Exit, Vec::new()).map(drop)
    }

    /// Ask VICE to quit, then close the connection.
    pub fn quit(&self) -> Result<(), MonitorError> {
        let result = match self.request(Command::Quit, Vec::new()) {
            // VICE may hang up before answering.
            Err(MonitorError::Connection(_) | MonitorError::Closed) | Ok(_) => Ok(()),
            Err(e) => Err(e),
        };
        self.close();
        result
    }

    /// Close the connection, failing any request still waiting.
    pub fn close(&self) {
        self.shared.shutdown(&MonitorError::Closed);
        if let Some(handle) = lock(&self.reader).take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for MonitorClient {
    fn drop(&mut self) {
        self.close();
    }
}

fn read_loop(shared: &Shared, mut stream: TcpStream) {
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 4096];

    let reason = 'read: loop {
        let n = match stream.read(&mut buf) {
            Ok(0) => break MonitorError::Connection("monitor closed the connection".to_string()),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => break MonitorError::from(e),
        };

        decoder.push(&buf[..n]);
        loop {
            match decoder.next_frame() {
                Ok(Some(frame)) => shared.dispatch(frame),
                Ok(None) => break,
                Err(e) => {
                    error!("{e}; closing monitor connection");
                    break 'read e;
                }
            }
        }
    };

    if shared.open.load(Ordering::Acquire) {
        warn!("monitor reader stopped: {reason}");
    }
    shared.shutdown(&reason);
}

fn check_range(address: u16, length: usize) -> Result<(), MonitorError> {
    if length == 0 {
        return Err(MonitorError::InvalidRequest("length must be at least 1".to_string()));
    }
    if usize::from(address) + length > 0x1_0000 {
        return Err(MonitorError::InvalidRequest(format!(
            "{length} bytes at ${address:04X} runs past $FFFF"
        )));
    }
    Ok(())
}

/// Memory get reply body: u16 length, then the bytes.
fn memory_payload(body: &[u8], expected: usize) -> Result<&[u8], MonitorError> {
    let [lo, hi, data @ ..] = body else {
        return Err(MonitorError::Protocol("memory_get reply has no length".to_string()));
    };
    let count = usize::from(u16::from_le_bytes([*lo, *hi]));
    if count != expected || data.len() < count {
        return Err(MonitorError::Protocol(format!(
            "memory_get returned {count} bytes ({} present), expected {expected}",
            data.len()
        )));
    }
    Ok(&data[..count])
}

/// Info reply body: u8 length + version bytes, u8 length + SVN revision.
fn parse_info(body: &[u8]) -> Result<MonitorInfo, MonitorError> {
    let truncated = || MonitorError::Protocol("truncated info reply".to_string());

    let (&version_len, rest) = body.split_first().ok_or_else(truncated)?;
    let version_len = usize::from(version_len);
    let version_bytes = rest.get(..version_len).ok_or_else(truncated)?;
    let version = version_bytes
        .iter()
        .map(u8::to_string)
        .collect::<Vec<_>>()
        .join(".");

    let svn_revision = match rest[version_len..].split_first() {
        Some((&len, [a, b, c, d, ..])) if len >= 4 => u32::from_le_bytes([*a, *b, *c, *d]),
        _ => 0,
    };

    Ok(MonitorInfo {
        version,
        svn_revision,
    })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
