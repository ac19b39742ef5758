use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use c64_codec::screen::detect_ready;
use c64_codec::{ByteBuffer, Prg, format_address, parse_address, parse_bytes};
use c64_device::{
    BackendKind, Device, DeviceConfig, PollConfig, ProgramKind, TaskOperation, TaskRunner,
    TaskStatus, TaskStore, TcpProbe, VerifyOptions, select_backend,
};
use clap::{Parser, Subcommand};
use log::info;
use serde_json::{Value as JsonValue, json};

/// Control a Commodore 64 over VICE's binary monitor or an Ultimate-64
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// JSON file with `hardware`, `emulator` and `poll` settings
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// Backend to use (overrides C64_MODE and the config file)
    #[clap(long, global = true)]
    mode: Option<BackendKind>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Describe the connected machine
    Info,
    /// List the operations the selected backend supports
    Caps,
    /// Read memory
    Peek {
        #[arg(value_parser = parse_address)]
        address: u16,
        length: usize,
    },
    /// Write memory
    Poke {
        #[arg(value_parser = parse_address)]
        address: u16,
        #[arg(value_parser = parse_bytes)]
        data: ByteBuffer,
        /// Pause, write, read back and resume
        #[clap(long)]
        verify: bool,
        /// Bytes the address must hold before writing (implies --verify)
        #[clap(long, value_parser = parse_bytes)]
        expect: Option<ByteBuffer>,
        /// Write even if --expect does not match
        #[clap(long)]
        force: bool,
    },
    /// Print the text screen
    Screen {
        /// Only report where this text appears
        #[clap(long)]
        find: Option<String>,
    },
    /// Load and start a PRG file, then report how it went
    Run {
        file: PathBuf,
        /// Treat the program as machine code even if it loads at $0801
        #[clap(long)]
        asm: bool,
        /// Use the short polling cadence
        #[clap(long)]
        quick: bool,
    },
    Reset {
        /// Power-cycle style reset (emulator only)
        #[clap(long)]
        hard: bool,
    },
    Pause,
    Resume,
    /// List task records from a task store
    Tasks {
        #[clap(long, default_value = "c64-tasks.json")]
        store: PathBuf,
    },
    /// Poll a memory range as a background task until it completes
    Watch {
        name: String,
        #[arg(value_parser = parse_address)]
        address: u16,
        length: usize,
        #[clap(long, default_value_t = 500)]
        interval_ms: u64,
        #[clap(long, default_value_t = 10)]
        count: u64,
        #[clap(long)]
        store: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let env = env_logger::Env::default()
        .filter_or("RUST_LOG", "warn")
        .write_style_or("RUST_LOG_STYLE", "auto");
    env_logger::init_from_env(env);

    let args = Args::parse();

    // Listing stored tasks needs no connection.
    if let Cmd::Tasks { store } = &args.command {
        return print(&list_tasks(store)?);
    }

    let config = match &args.config {
        Some(path) => DeviceConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => DeviceConfig::default(),
    };
    let mode = match args.mode {
        Some(mode) => Some(mode),
        None => BackendKind::from_env()?,
    };
    let selection = select_backend(mode, &config, &TcpProbe::default())?;
    let device = Arc::new(
        Device::connect(&selection)
            .with_context(|| format!("failed to connect to {}", selection.endpoint.host))?,
    );
    info!("using {} at {}", device.kind(), device.endpoint());

    let output = execute(&device, &config, args.command)?;
    print(&output)
}

fn execute(device: &Arc<Device>, config: &DeviceConfig, command: Cmd) -> Result<JsonValue> {
    let value = match command {
        Cmd::Info => device.info()?,
        Cmd::Caps => json!({
            "backend": device.kind(),
            "capabilities": device.capabilities(),
        }),
        Cmd::Peek { address, length } => json!({
            "address": format_address(address),
            "data": device.read_memory(address, length)?,
        }),
        Cmd::Poke {
            address,
            data,
            verify,
            expect,
            force,
        } => {
            if verify || expect.is_some() {
                let options = VerifyOptions {
                    expected: expect,
                    continue_on_mismatch: force,
                };
                serde_json::to_value(device.write_verified(address, &data, &options)?)?
            } else {
                device.write_memory(address, &data)?;
                json!({ "address": format_address(address), "written": data })
            }
        }
        Cmd::Screen { find: Some(needle) } => {
            let found = device.find_screen_text(&needle)?;
            json!({
                "needle": needle,
                "found": found.map(|(row, col)| json!({ "row": row, "col": col })),
            })
        }
        Cmd::Screen { find: None } => {
            let text = device.read_screen_text()?;
            let (ready, reason) = detect_ready(&text);
            json!({ "text": text, "ready": ready, "reason": reason })
        }
        Cmd::Run { file, asm, quick } => {
            let bytes =
                std::fs::read(&file).with_context(|| format!("failed to read {}", file.display()))?;
            let prg = Prg::parse(&bytes)?;
            let poll = if quick {
                PollConfig::quick()
            } else {
                config.poll_or(PollConfig::default())
            };
            let kind = asm.then_some(ProgramKind::Asm);
            serde_json::to_value(device.run_and_validate(&prg, kind, poll)?)?
        }
        Cmd::Reset { hard } => {
            let outcome = if hard {
                device.hard_reset()?
            } else {
                device.reset()?
            };
            serde_json::to_value(outcome)?
        }
        Cmd::Pause => serde_json::to_value(device.pause()?)?,
        Cmd::Resume => serde_json::to_value(device.resume()?)?,
        Cmd::Watch {
            name,
            address,
            length,
            interval_ms,
            count,
            store,
        } => {
            let runner = match store {
                Some(path) => TaskRunner::with_store(Arc::clone(device), TaskStore::new(path))?,
                None => TaskRunner::new(Arc::clone(device)),
            };
            runner.start(
                &name,
                TaskOperation::ReadMemory { address, length },
                Duration::from_millis(interval_ms),
                Some(count),
            )?;
            while runner
                .get(&name)
                .is_some_and(|record| record.status == TaskStatus::Running)
            {
                thread::sleep(Duration::from_millis(50));
            }
            serde_json::to_value(runner.get(&name))?
        }
        Cmd::Tasks { store } => list_tasks(&store)?,
    };
    Ok(value)
}

fn list_tasks(store: &Path) -> Result<JsonValue> {
    let records = TaskStore::new(store).load()?;
    Ok(serde_json::to_value(records.into_values().collect::<Vec<_>>())?)
}

fn print(value: &JsonValue) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
