//! UDP relay between VISCA controllers and one camera.
//!
//! Lets several controllers (or one controller on another subnet) share a
//! camera: commands are forwarded to the camera and its replies go back to
//! whichever controller spoke last.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

const MAX_PACKET: usize = 1024;
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// First IPv4 address for `host`; the relay socket is IPv4 only.
pub fn resolve(host: &str, port: u16) -> Option<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .ok()?
        .find(SocketAddr::is_ipv4)
}

pub struct Relay {
    port: u16,
    camera: Arc<Mutex<Option<SocketAddr>>>,
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Relay {
    /// Binds `0.0.0.0:port` and starts relaying; port 0 picks a free port.
    pub fn spawn(port: u16) -> io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port))?;
        socket.set_read_timeout(Some(POLL_INTERVAL))?;
        let port = socket.local_addr()?.port();

        let camera = Arc::new(Mutex::new(None));
        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let camera = Arc::clone(&camera);
            let stop = Arc::clone(&stop);
            thread::spawn(move || serve(socket, camera, stop))
        };

        Ok(Self {
            port,
            camera,
            stop,
            handle: Some(handle),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn camera(&self) -> Option<SocketAddr> {
        *self.camera.lock()
    }

    /// Retargets the relay. An unresolvable host leaves the old destination
    /// in place and returns `false`.
    pub fn set_camera(&self, host: &str, port: u16) -> bool {
        match resolve(host, port) {
            Some(addr) => {
                log::info!("relay {} -> camera {}", self.port, addr);
                *self.camera.lock() = Some(addr);
                true
            }
            None => {
                log::warn!("relay {}: cannot resolve {}:{}", self.port, host, port);
                false
            }
        }
    }

    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn serve(socket: UdpSocket, camera: Arc<Mutex<Option<SocketAddr>>>, stop: Arc<AtomicBool>) {
    let mut buf = [0u8; MAX_PACKET];
    // Kept across replies: one command may produce an ACK and a completion
    let mut controller: Option<SocketAddr> = None;

    while !stop.load(Ordering::Relaxed) {
        let (len, from) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock
                        | io::ErrorKind::TimedOut
                        | io::ErrorKind::ConnectionReset
                ) =>
            {
                continue
            }
            Err(e) => {
                log::error!("relay receive failed: {}", e);
                break;
            }
        };

        let camera_addr = *camera.lock();
        let destination = if Some(from) == camera_addr {
            controller
        } else {
            controller = Some(from);
            camera_addr
        };

        if let Some(destination) = destination {
            log::trace!("{} bytes {} -> {}", len, from, destination);
            if let Err(e) = socket.send_to(&buf[..len], destination) {
                log::debug!("relay send to {} failed: {}", destination, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> UdpSocket {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        socket
    }

    fn recv(socket: &UdpSocket) -> (Vec<u8>, SocketAddr) {
        let mut buf = [0u8; MAX_PACKET];
        let (len, from) = socket.recv_from(&mut buf).unwrap();
        (buf[..len].to_vec(), from)
    }

    fn relay_to(camera: &UdpSocket) -> Relay {
        let relay = Relay::spawn(0).unwrap();
        let port = camera.local_addr().unwrap().port();
        assert!(relay.set_camera("127.0.0.1", port));
        relay
    }

    #[test]
    fn commands_reach_camera_and_replies_return() {
        let camera = endpoint();
        let controller = endpoint();
        let mut relay = relay_to(&camera);
        let relay_addr = ("127.0.0.1", relay.port());

        controller.send_to(&[0x81, 0x01, 0xFF], relay_addr).unwrap();
        let (packet, from) = recv(&camera);
        assert_eq!(packet, vec![0x81, 0x01, 0xFF]);

        // ACK then completion both go back to the controller
        camera.send_to(&[0x90, 0x41, 0xFF], from).unwrap();
        camera.send_to(&[0x90, 0x51, 0xFF], from).unwrap();
        assert_eq!(recv(&controller).0, vec![0x90, 0x41, 0xFF]);
        assert_eq!(recv(&controller).0, vec![0x90, 0x51, 0xFF]);

        relay.shutdown();
    }

    #[test]
    fn replies_follow_the_latest_controller() {
        let camera = endpoint();
        let first = endpoint();
        let second = endpoint();
        let mut relay = relay_to(&camera);
        let relay_addr = ("127.0.0.1", relay.port());

        first.send_to(b"one", relay_addr).unwrap();
        let (_, relay_side) = recv(&camera);
        second.send_to(b"two", relay_addr).unwrap();
        assert_eq!(recv(&camera).0, b"two");

        camera.send_to(b"reply", relay_side).unwrap();
        assert_eq!(recv(&second).0, b"reply");

        first
            .set_read_timeout(Some(Duration::from_millis(200)))
            .unwrap();
        let mut buf = [0u8; 16];
        assert!(first.recv_from(&mut buf).is_err());

        relay.shutdown();
    }

    #[test]
    fn unresolvable_host_keeps_destination() {
        let camera = endpoint();
        let mut relay = relay_to(&camera);
        let before = relay.camera();
        assert!(before.is_some());

        assert!(!relay.set_camera("camera.invalid", 52381));
        assert_eq!(relay.camera(), before);

        relay.shutdown();
    }

    #[test]
    fn packets_without_camera_are_dropped() {
        let camera = endpoint();
        let controller = endpoint();
        let mut relay = Relay::spawn(0).unwrap();
        let relay_addr = ("127.0.0.1", relay.port());
        assert_eq!(relay.camera(), None);

        controller.send_to(b"early", relay_addr).unwrap();
        thread::sleep(Duration::from_millis(100));

        relay.set_camera("127.0.0.1", camera.local_addr().unwrap().port());
        controller.send_to(b"late", relay_addr).unwrap();
        assert_eq!(recv(&camera).0, b"late");

        relay.shutdown();
    }
}
