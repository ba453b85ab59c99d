//! Gamepad input thread.
//!
//! Reads `gilrs` events, follows the first connected gamepad, and forwards
//! its input to the command processor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use gilrs::{EventType, GamepadId, Gilrs};

use crate::app::AppEvent;
use crate::controller::{Axis, Button, InputEvent};

const WAIT: Duration = Duration::from_millis(100);

pub fn map_button(button: gilrs::Button) -> Option<Button> {
    use gilrs::Button as G;
    Some(match button {
        G::South => Button::South,
        G::East => Button::East,
        G::West => Button::West,
        G::North => Button::North,
        G::LeftTrigger => Button::LeftBumper,
        G::RightTrigger => Button::RightBumper,
        G::Select => Button::Select,
        G::Start => Button::Start,
        G::LeftThumb => Button::LeftThumb,
        G::RightThumb => Button::RightThumb,
        G::DPadUp => Button::DPadUp,
        G::DPadDown => Button::DPadDown,
        G::DPadLeft => Button::DPadLeft,
        G::DPadRight => Button::DPadRight,
        _ => return None,
    })
}

pub fn map_axis(axis: gilrs::Axis) -> Option<Axis> {
    use gilrs::Axis as G;
    Some(match axis {
        G::LeftStickX => Axis::LeftStickX,
        G::LeftStickY => Axis::LeftStickY,
        G::RightStickX => Axis::RightStickX,
        G::RightStickY => Axis::RightStickY,
        _ => return None,
    })
}

/// Translates one gilrs event; analog triggers arrive as button values.
pub fn translate(event: &EventType) -> Option<InputEvent> {
    match *event {
        EventType::ButtonPressed(button, _) => map_button(button).map(InputEvent::Pressed),
        EventType::ButtonReleased(button, _) => map_button(button).map(InputEvent::Released),
        EventType::ButtonChanged(gilrs::Button::LeftTrigger2, value, _) => {
            Some(InputEvent::Moved(Axis::LeftTrigger, value))
        }
        EventType::ButtonChanged(gilrs::Button::RightTrigger2, value, _) => {
            Some(InputEvent::Moved(Axis::RightTrigger, value))
        }
        EventType::AxisChanged(axis, value, _) => {
            map_axis(axis).map(|axis| InputEvent::Moved(axis, value))
        }
        _ => None,
    }
}

pub struct GamepadListener {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl GamepadListener {
    pub fn spawn(tx: Sender<AppEvent>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let handle = thread::spawn(move || listen(tx, thread_stop));
        Self {
            stop,
            handle: Some(handle),
        }
    }

    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for GamepadListener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn first_gamepad(gilrs: &Gilrs) -> Option<(GamepadId, String)> {
    gilrs
        .gamepads()
        .find(|(_, pad)| pad.is_connected())
        .map(|(id, pad)| (id, pad.name().to_string()))
}

fn listen(tx: Sender<AppEvent>, stop: Arc<AtomicBool>) {
    let mut gilrs = match Gilrs::new() {
        Ok(gilrs) => gilrs,
        Err(gilrs::Error::NotImplemented(gilrs)) => {
            log::warn!("gamepad input is not supported on this platform");
            gilrs
        }
        Err(e) => {
            log::error!("failed to initialise gamepad input: {}", e);
            return;
        }
    };

    let mut active: Option<GamepadId> = None;
    if let Some((id, name)) = first_gamepad(&gilrs) {
        active = Some(id);
        if tx.send(AppEvent::GamepadConnected(name)).is_err() {
            return;
        }
    }

    while !stop.load(Ordering::Relaxed) {
        let Some(event) = gilrs.next_event_blocking(Some(WAIT)) else {
            continue;
        };

        let message = match event.event {
            EventType::Connected if active.is_none() => {
                active = Some(event.id);
                Some(AppEvent::GamepadConnected(
                    gilrs.gamepad(event.id).name().to_string(),
                ))
            }
            EventType::Disconnected if active == Some(event.id) => {
                active = None;
                if tx.send(AppEvent::GamepadDisconnected).is_err() {
                    return;
                }
                first_gamepad(&gilrs).map(|(id, name)| {
                    active = Some(id);
                    AppEvent::GamepadConnected(name)
                })
            }
            ref other if active == Some(event.id) => {
                translate(other).map(|input| AppEvent::Input(input, Instant::now()))
            }
            _ => None,
        };

        if let Some(message) = message {
            if tx.send(message).is_err() {
                return;
            }
        }
    }
}
