//! Bitfocus Companion UDP API client.
//!
//! Companion triggers actions such as switching the preview source; its
//! buttons are addressed by page, row and column.

use std::io;
use std::net::UdpSocket;

pub struct Companion {
    socket: UdpSocket,
    host: String,
    port: u16,
}

pub fn press_message(page: u32, row: u32, column: u32) -> String {
    format!("LOCATION {}/{}/{} PRESS", page, row, column)
}

impl Companion {
    pub fn new(host: impl Into<String>, port: u16) -> io::Result<Self> {
        Ok(Self {
            socket: UdpSocket::bind(("0.0.0.0", 0))?,
            host: host.into(),
            port,
        })
    }

    /// Presses a button; failures are logged and otherwise ignored.
    pub fn pushbutton(&self, (page, row, column): (u32, u32, u32)) {
        let message = press_message(page, row, column);
        log::debug!("companion: {}", message);
        if let Err(e) = self
            .socket
            .send_to(message.as_bytes(), (self.host.as_str(), self.port))
        {
            log::warn!("companion send failed: {}", e);
        }
    }
}
