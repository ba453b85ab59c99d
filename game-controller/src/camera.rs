//! VISCA over IP camera control.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use thiserror::Error;

const PAYLOAD_COMMAND: u16 = 0x0100;
const PAYLOAD_CONTROL: u16 = 0x0200;
const PAYLOAD_CONTROL_REPLY: u16 = 0x0201;
const HEADER_LEN: usize = 8;
const TERMINATOR: u8 = 0xFF;

pub const MAX_PAN_SPEED: u8 = 0x18;
pub const MAX_TILT_SPEED: u8 = 0x17;
pub const MAX_ZOOM_SPEED: u8 = 7;
pub const MAX_FOCUS_SPEED: u8 = 7;
pub const MAX_PRESET: u8 = 127;

#[derive(Debug, Error)]
pub enum ViscaError {
    #[error("camera address {0} did not resolve")]
    Resolve(String),
    #[error("network error: {0}")]
    Io(#[from] io::Error),
    #[error("no response from camera")]
    Timeout,
    #[error("command syntax error")]
    Syntax,
    #[error("command buffer full")]
    BufferFull,
    #[error("command cancelled")]
    Cancelled,
    #[error("no socket")]
    NoSocket,
    #[error("command not executable")]
    NotExecutable,
    #[error("unexpected reply {0:02X?}")]
    UnexpectedReply(Vec<u8>),
    #[error("preset {0} is out of range")]
    PresetOutOfRange(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusMode {
    Auto,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExposureMode {
    Auto,
    Manual,
    ShutterPriority,
    IrisPriority,
    Bright,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhiteBalanceMode {
    Auto,
    Indoor,
    Outdoor,
    OnePush,
    OnePushTrigger,
}

/// PTZ camera operations used by the control handlers.
///
/// Speeds are signed: positive pans right, tilts up, zooms in (tele) and
/// focuses far. Zero stops the movement.
pub trait Camera: Send {
    fn pantilt(&mut self, pan_speed: i32, tilt_speed: i32) -> Result<(), ViscaError>;
    fn zoom(&mut self, speed: i32) -> Result<(), ViscaError>;
    fn manual_focus(&mut self, speed: i32) -> Result<(), ViscaError>;
    fn set_focus_mode(&mut self, mode: FocusMode) -> Result<(), ViscaError>;
    fn autoexposure_mode(&mut self, mode: ExposureMode) -> Result<(), ViscaError>;
    fn increase_exposure_compensation(&mut self) -> Result<(), ViscaError>;
    fn decrease_exposure_compensation(&mut self) -> Result<(), ViscaError>;
    fn save_preset(&mut self, preset: u8) -> Result<(), ViscaError>;
    fn recall_preset(&mut self, preset: u8) -> Result<(), ViscaError>;
    fn white_balance_mode(&mut self, mode: WhiteBalanceMode) -> Result<(), ViscaError>;
    fn close(&mut self);
}

/// Builds the 8-byte VISCA over IP header followed by the payload.
pub fn frame(payload_type: u16, sequence: u32, payload: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(HEADER_LEN + payload.len());
    message.extend_from_slice(&payload_type.to_be_bytes());
    message.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    message.extend_from_slice(&sequence.to_be_bytes());
    message.extend_from_slice(payload);
    message
}

fn clamp_speed(speed: i32, max: u8) -> u8 {
    speed.unsigned_abs().min(u32::from(max)) as u8
}

pub fn pantilt_command(pan_speed: i32, tilt_speed: i32) -> Vec<u8> {
    let pan = clamp_speed(pan_speed, MAX_PAN_SPEED).max(1);
    let tilt = clamp_speed(tilt_speed, MAX_TILT_SPEED).max(1);
    let pan_dir = match pan_speed.signum() {
        -1 => 0x01,
        1 => 0x02,
        _ => 0x03,
    };
    let tilt_dir = match tilt_speed.signum() {
        1 => 0x01,
        -1 => 0x02,
        _ => 0x03,
    };
    vec![0x81, 0x01, 0x06, 0x01, pan, tilt, pan_dir, tilt_dir, TERMINATOR]
}

/// Variable-speed drive: `0x2p` for positive, `0x3p` for negative, `0x00` stop.
fn drive_command(category: u8, speed: i32, max: u8) -> Vec<u8> {
    let p = clamp_speed(speed, max);
    let arg = match speed.signum() {
        1 => 0x20 | p,
        -1 => 0x30 | p,
        _ => 0x00,
    };
    vec![0x81, 0x01, 0x04, category, arg, TERMINATOR]
}

pub fn zoom_command(speed: i32) -> Vec<u8> {
    drive_command(0x07, speed, MAX_ZOOM_SPEED)
}

pub fn focus_command(speed: i32) -> Vec<u8> {
    drive_command(0x08, speed, MAX_FOCUS_SPEED)
}

pub fn focus_mode_command(mode: FocusMode) -> Vec<u8> {
    let arg = match mode {
        FocusMode::Auto => 0x02,
        FocusMode::Manual => 0x03,
    };
    vec![0x81, 0x01, 0x04, 0x38, arg, TERMINATOR]
}

pub fn exposure_mode_command(mode: ExposureMode) -> Vec<u8> {
    let arg = match mode {
        ExposureMode::Auto => 0x00,
        ExposureMode::Manual => 0x03,
        ExposureMode::ShutterPriority => 0x0A,
        ExposureMode::IrisPriority => 0x0B,
        ExposureMode::Bright => 0x0D,
    };
    vec![0x81, 0x01, 0x04, 0x39, arg, TERMINATOR]
}

pub fn exposure_compensation_command(up: bool) -> Vec<u8> {
    vec![0x81, 0x01, 0x04, 0x0E, if up { 0x02 } else { 0x03 }, TERMINATOR]
}

pub fn exposure_compensation_on_command() -> Vec<u8> {
    vec![0x81, 0x01, 0x04, 0x3E, 0x02, TERMINATOR]
}

pub fn preset_command(save: bool, preset: u8) -> Result<Vec<u8>, ViscaError> {
    if preset > MAX_PRESET {
        return Err(ViscaError::PresetOutOfRange(preset));
    }
    let op = if save { 0x01 } else { 0x02 };
    Ok(vec![0x81, 0x01, 0x04, 0x3F, op, preset, TERMINATOR])
}

pub fn white_balance_command(mode: WhiteBalanceMode) -> Vec<u8> {
    match mode {
        WhiteBalanceMode::Auto => vec![0x81, 0x01, 0x04, 0x35, 0x00, TERMINATOR],
        WhiteBalanceMode::Indoor => vec![0x81, 0x01, 0x04, 0x35, 0x01, TERMINATOR],
        WhiteBalanceMode::Outdoor => vec![0x81, 0x01, 0x04, 0x35, 0x02, TERMINATOR],
        WhiteBalanceMode::OnePush => vec![0x81, 0x01, 0x04, 0x35, 0x03, TERMINATOR],
        WhiteBalanceMode::OnePushTrigger => vec![0x81, 0x01, 0x04, 0x10, 0x05, TERMINATOR],
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Reply {
    Ack,
    Completion,
    Error(u8),
    Other,
}

fn parse_reply(payload: &[u8]) -> Reply {
    match payload {
        [0x90, kind, rest @ ..] => match kind & 0xF0 {
            0x40 => Reply::Ack,
            0x50 => Reply::Completion,
            0x60 => Reply::Error(rest.first().copied().unwrap_or(0)),
            _ => Reply::Other,
        },
        _ => Reply::Other,
    }
}

fn error_for(code: u8) -> ViscaError {
    match code {
        0x02 => ViscaError::Syntax,
        0x03 => ViscaError::BufferFull,
        0x04 => ViscaError::Cancelled,
        0x05 => ViscaError::NoSocket,
        _ => ViscaError::NotExecutable,
    }
}

/// A Sony-style VISCA over IP camera reached over UDP.
pub struct ViscaCamera {
    socket: Option<UdpSocket>,
    sequence: u32,
}

impl ViscaCamera {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

    pub fn connect(host: &str, port: u16) -> Result<Self, ViscaError> {
        Self::connect_with_timeout(host, port, Self::DEFAULT_TIMEOUT)
    }

    pub fn connect_with_timeout(host: &str, port: u16, timeout: Duration) -> Result<Self, ViscaError> {
        let address = (host, port)
            .to_socket_addrs()
            .map_err(|_| ViscaError::Resolve(host.to_string()))?
            .find(SocketAddr::is_ipv4)
            .ok_or_else(|| ViscaError::Resolve(host.to_string()))?;

        let socket = UdpSocket::bind(("0.0.0.0", 0))?;
        socket.connect(address)?;
        socket.set_read_timeout(Some(timeout))?;

        let mut camera = Self {
            socket: Some(socket),
            sequence: 0,
        };
        camera.reset_sequence_number()?;
        Ok(camera)
    }

    fn socket(&self) -> Result<&UdpSocket, ViscaError> {
        self.socket.as_ref().ok_or(ViscaError::NoSocket)
    }

    fn reset_sequence_number(&mut self) -> Result<(), ViscaError> {
        self.sequence = 0;
        let message = frame(PAYLOAD_CONTROL, self.sequence, &[0x01]);
        let socket = self.socket()?;
        socket.send(&message)?;

        let mut buf = [0u8; 64];
        let len = recv(socket, &mut buf)?;
        if len >= 2 && u16::from_be_bytes([buf[0], buf[1]]) == PAYLOAD_CONTROL_REPLY {
            Ok(())
        } else {
            Err(ViscaError::UnexpectedReply(buf[..len].to_vec()))
        }
    }

    /// Sends one command and waits for its completion or error reply.
    /// Replies carrying another sequence number are late answers to an
    /// earlier command and are skipped.
    fn send_command(&mut self, payload: &[u8]) -> Result<(), ViscaError> {
        self.sequence = self.sequence.wrapping_add(1);
        let sequence = self.sequence;
        let message = frame(PAYLOAD_COMMAND, sequence, payload);
        let socket = self.socket()?;
        socket.send(&message)?;

        let mut buf = [0u8; 64];
        loop {
            let len = recv(socket, &mut buf)?;
            let reply = &buf[..len];
            if len < HEADER_LEN {
                return Err(ViscaError::UnexpectedReply(reply.to_vec()));
            }
            if reply_sequence(reply) != sequence {
                log::debug!("skipping stale reply {:02X?}", reply);
                continue;
            }
            match parse_reply(&reply[HEADER_LEN..]) {
                Reply::Ack => continue,
                Reply::Completion => return Ok(()),
                Reply::Error(code) => return Err(error_for(code)),
                Reply::Other => return Err(ViscaError::UnexpectedReply(reply.to_vec())),
            }
        }
    }
}

fn reply_sequence(message: &[u8]) -> u32 {
    u32::from_be_bytes([message[4], message[5], message[6], message[7]])
}

fn recv(socket: &UdpSocket, buf: &mut [u8]) -> Result<usize, ViscaError> {
    match socket.recv(buf) {
        Ok(len) => Ok(len),
        Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
            Err(ViscaError::Timeout)
        }
        Err(e) => Err(e.into()),
    }
}

impl Camera for ViscaCamera {
    fn pantilt(&mut self, pan_speed: i32, tilt_speed: i32) -> Result<(), ViscaError> {
        self.send_command(&pantilt_command(pan_speed, tilt_speed))
    }

    fn zoom(&mut self, speed: i32) -> Result<(), ViscaError> {
        self.send_command(&zoom_command(speed))
    }

    fn manual_focus(&mut self, speed: i32) -> Result<(), ViscaError> {
        self.send_command(&focus_command(speed))
    }

    fn set_focus_mode(&mut self, mode: FocusMode) -> Result<(), ViscaError> {
        self.send_command(&focus_mode_command(mode))
    }

    fn autoexposure_mode(&mut self, mode: ExposureMode) -> Result<(), ViscaError> {
        self.send_command(&exposure_mode_command(mode))
    }

    fn increase_exposure_compensation(&mut self) -> Result<(), ViscaError> {
        self.send_command(&exposure_compensation_on_command())?;
        self.send_command(&exposure_compensation_command(true))
    }

    fn decrease_exposure_compensation(&mut self) -> Result<(), ViscaError> {
        self.send_command(&exposure_compensation_on_command())?;
        self.send_command(&exposure_compensation_command(false))
    }

    fn save_preset(&mut self, preset: u8) -> Result<(), ViscaError> {
        let command = preset_command(true, preset)?;
        self.send_command(&command)
    }

    fn recall_preset(&mut self, preset: u8) -> Result<(), ViscaError> {
        let command = preset_command(false, preset)?;
        self.send_command(&command)
    }

    fn white_balance_mode(&mut self, mode: WhiteBalanceMode) -> Result<(), ViscaError> {
        self.send_command(&white_balance_command(mode))
    }

    fn close(&mut self) {
        self.socket = None;
    }
}
