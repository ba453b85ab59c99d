//! OSC control surface.
//!
//! Listens for OSC over UDP and turns recognised messages into requests for
//! the command processor.

use std::io;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;
use rosc::{OscMessage, OscPacket, OscType};

use crate::app::AppEvent;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OscRequest {
    SelectCamera(i64),
}

/// Floats truncate toward zero, so `/setcam 2.7` selects camera 2.
fn int_arg(arg: &OscType) -> Option<i64> {
    match arg {
        OscType::Int(v) => Some(i64::from(*v)),
        OscType::Long(v) => Some(*v),
        OscType::Float(v) if v.is_finite() => Some(v.trunc() as i64),
        OscType::Double(v) if v.is_finite() => Some(v.trunc() as i64),
        OscType::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn message_request(message: &OscMessage) -> Option<OscRequest> {
    match message.addr.as_str() {
        "/setcam" => match message.args.first().and_then(int_arg) {
            Some(camera) => Some(OscRequest::SelectCamera(camera)),
            None => {
                log::warn!("OSC Set Camera: bad arguments {:?}", message.args);
                None
            }
        },
        other => {
            log::debug!("OSC: ignoring {}", other);
            None
        }
    }
}

/// Requests carried by a packet, bundles included.
pub fn requests(packet: &OscPacket) -> Vec<OscRequest> {
    match packet {
        OscPacket::Message(message) => message_request(message).into_iter().collect(),
        OscPacket::Bundle(bundle) => bundle.content.iter().flat_map(requests).collect(),
    }
}

pub struct OscServer {
    port: u16,
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl OscServer {
    /// Binds `0.0.0.0:port` and forwards requests until shut down.
    pub fn spawn(port: u16, tx: Sender<AppEvent>) -> io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port))?;
        socket.set_read_timeout(Some(POLL_INTERVAL))?;
        let port = socket.local_addr()?.port();

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let handle = thread::spawn(move || serve(socket, tx, thread_stop));

        log::info!("OSC listening on port {}", port);
        Ok(Self {
            port,
            stop,
            handle: Some(handle),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for OscServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn serve(socket: UdpSocket, tx: Sender<AppEvent>, stop: Arc<AtomicBool>) {
    let mut buf = [0u8; rosc::decoder::MTU];
    while !stop.load(Ordering::Relaxed) {
        let len = match socket.recv_from(&mut buf) {
            Ok((len, _)) => len,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                continue
            }
            Err(e) if e.kind() == io::ErrorKind::ConnectionReset => continue,
            Err(e) => {
                log::error!("OSC receive failed: {}", e);
                break;
            }
        };

        let packet = match rosc::decoder::decode_udp(&buf[..len]) {
            Ok((_, packet)) => packet,
            Err(e) => {
                log::warn!("OSC: undecodable packet: {:?}", e);
                continue;
            }
        };

        for request in requests(&packet) {
            if tx.send(AppEvent::Osc(request)).is_err() {
                return;
            }
        }
    }
}
