use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

mod relay;

use relay::Relay;

const DEFAULT_BASE_PORT: u16 = 10000;
const VISCA_PORT: u16 = 52381;

#[derive(Parser)]
#[command(name = "visca-relay")]
#[command(about = "Relay VISCA over IP packets between controllers and cameras")]
#[command(version = version_info::current().product_version)]
struct Args {
    #[arg(
        long = "camera",
        value_name = "HOST[:PORT]",
        required = true,
        help = "Camera to relay to; relay N listens on base-port + N"
    )]
    cameras: Vec<String>,

    #[arg(long, default_value_t = DEFAULT_BASE_PORT)]
    base_port: u16,

    #[arg(long, help = "Log level: trace, debug, info, warn, error, off")]
    log_level: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "command")]
enum Command {
    #[serde(rename = "set-camera")]
    SetCamera {
        index: usize,
        host: String,
        #[serde(default = "default_port")]
        port: u16,
    },
    #[serde(rename = "status")]
    Status,
    #[serde(rename = "quit")]
    Quit,
}

const fn default_port() -> u16 {
    VISCA_PORT
}

fn split_host_port(text: &str) -> Result<(String, u16)> {
    let text = text.trim();
    let (host, port) = match text.rsplit_once(':') {
        Some((host, port)) => (
            host,
            port.parse().with_context(|| format!("bad port in {:?}", text))?,
        ),
        None => (text, VISCA_PORT),
    };
    if host.is_empty() {
        bail!("missing host in {:?}", text);
    }
    Ok((host.to_string(), port))
}

fn listen_port(base_port: u16, index: usize) -> Result<u16> {
    u16::try_from(index + 1)
        .ok()
        .and_then(|offset| base_port.checked_add(offset))
        .with_context(|| format!("relay {} is past the last port", index))
}

struct CommandProcessor<W: Write> {
    rx: Receiver<Command>,
    relays: Vec<Relay>,
    shutdown: Arc<AtomicBool>,
    out: W,
}

impl<W: Write> CommandProcessor<W> {
    fn new(rx: Receiver<Command>, relays: Vec<Relay>, out: W) -> Self {
        Self {
            rx,
            relays,
            shutdown: Arc::new(AtomicBool::new(false)),
            out,
        }
    }

    fn run(&mut self) {
        while !self.shutdown.load(Ordering::Relaxed) {
            match self.rx.recv_timeout(Duration::from_millis(250)) {
                Ok(command) => {
                    if !self.handle_command(command) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                // stdin closed; keep relaying until signalled
                Err(RecvTimeoutError::Disconnected) => {
                    thread::sleep(Duration::from_millis(250));
                }
            }
        }
        for relay in &mut self.relays {
            relay.shutdown();
        }
    }

    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::SetCamera { index, host, port } => {
                let ok = match self.relays.get(index) {
                    Some(relay) => relay.set_camera(&host, port),
                    None => {
                        log::warn!("no relay {}", index);
                        false
                    }
                };
                self.emit(json!({ "type": "set-camera", "index": index, "ok": ok }));
            }
            Command::Status => {
                let relays: Vec<Value> = self
                    .relays
                    .iter()
                    .map(|relay| {
                        json!({
                            "port": relay.port(),
                            "camera": relay.camera().map(|addr| addr.to_string()),
                        })
                    })
                    .collect();
                self.emit(json!({ "type": "status", "relays": relays }));
            }
            Command::Quit => return false,
        }
        true
    }

    fn emit(&mut self, mut event: Value) {
        event["timestamp"] = json!(Utc::now().to_rfc3339());
        if let Err(e) = writeln!(self.out, "{}", event).and_then(|()| self.out.flush()) {
            log::error!("Error writing event: {}", e);
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    visca_logging::init("visca-relay", args.log_level.as_deref(), false);

    let mut relays = Vec::with_capacity(args.cameras.len());
    for (index, camera) in args.cameras.iter().enumerate() {
        let (host, port) = split_host_port(camera)?;
        let listen = listen_port(args.base_port, index)?;
        let relay = Relay::spawn(listen)
            .with_context(|| format!("failed to bind relay port {}", listen))?;
        if !relay.set_camera(&host, port) {
            log::warn!("relay {} has no camera until set-camera succeeds", listen);
        }
        relays.push(relay);
    }

    let (tx, rx) = crossbeam_channel::unbounded();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Command>(&line) {
                Ok(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                Err(e) => log::warn!("Error parsing command: {}", e),
            }
        }
    });

    let mut processor = CommandProcessor::new(rx, relays, io::stdout());
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&processor.shutdown))
            .context("failed to register signal handler")?;
    }
    processor.run();
    Ok(())
}
