//! Game controller abstraction.
//!
//! Raw gamepad input is turned into [`ControlEvent`]s for the functions in the
//! layout below. Only one controller is followed at a time.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;

pub const HELP_TEXT: &str = "\
VISCA Game Controller - control IP PTZ cameras using a Game Controller

Pan & Tilt: Left stick
Zoom: Right stick
Brightness: Left bumper: Decrease, Right: Increase
Manual Focus: Left trigger: Near, Right: Far
Select Camera: A, B, X, Y = 1:4; Long press = 5:8 (selects camera in Preview)
Fade Preview to Program: Push left or right stick
Start button: AutoFocus
Back button: short press = one push white balance, long press = auto white balance
D-pad: short press = recall preset 1-8, long press = set preset 1-8
";

/// How long the D-pad must be stable before its direction is read.
pub const HAT_SETTLE: Duration = Duration::from_millis(100);

/// Actions that controller inputs can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ControlFunc {
    None,
    CameraSelect,
    BrightnessUp,
    BrightnessDown,
    Preset,
    Prev2Prog,
    AutoFocus,
    WhiteBalance,
    PanTilt,
    Zoom,
    FocusNear,
    FocusFar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    South,
    East,
    West,
    North,
    LeftBumper,
    RightBumper,
    Select,
    Start,
    LeftThumb,
    RightThumb,
    DPadUp,
    DPadDown,
    DPadLeft,
    DPadRight,
}

/// Sticks report -1..=1 with up and right positive; triggers report 0..=1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    LeftStickX,
    LeftStickY,
    RightStickX,
    RightStickY,
    LeftTrigger,
    RightTrigger,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    Pressed(Button),
    Released(Button),
    Moved(Axis, f32),
}

const BUTTON_LAYOUT: [(Button, ControlFunc, u8); 10] = [
    (Button::South, ControlFunc::CameraSelect, 1),
    (Button::East, ControlFunc::CameraSelect, 2),
    (Button::West, ControlFunc::CameraSelect, 3),
    (Button::North, ControlFunc::CameraSelect, 4),
    (Button::RightBumper, ControlFunc::BrightnessUp, 0),
    (Button::LeftBumper, ControlFunc::BrightnessDown, 0),
    (Button::Start, ControlFunc::AutoFocus, 0),
    (Button::Select, ControlFunc::WhiteBalance, 0),
    (Button::LeftThumb, ControlFunc::Prev2Prog, 0),
    (Button::RightThumb, ControlFunc::Prev2Prog, 0),
];

const AXIS_LAYOUT: [(Axis, ControlFunc); 5] = [
    (Axis::LeftStickX, ControlFunc::PanTilt),
    (Axis::LeftStickY, ControlFunc::PanTilt),
    (Axis::RightStickY, ControlFunc::Zoom),
    (Axis::LeftTrigger, ControlFunc::FocusNear),
    (Axis::RightTrigger, ControlFunc::FocusFar),
];

/// A press or release of a mapped button (or the D-pad acting as one).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ButtonEvent {
    pub func: ControlFunc,
    pub value: u8,
    pub is_down: bool,
    pub long_press: bool,
    pub double_click: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlEvent {
    Button(ButtonEvent),
    Axis { func: ControlFunc, axis: Axis },
}

#[derive(Debug, Clone)]
struct ButtonState {
    func: ControlFunc,
    value: u8,
    is_down: bool,
    time_down: Option<Instant>,
    long_press: bool,
    double_click: bool,
}

impl ButtonState {
    fn new(func: ControlFunc, value: u8) -> Self {
        Self {
            func,
            value,
            is_down: false,
            time_down: None,
            long_press: false,
            double_click: false,
        }
    }

    fn event(&self) -> ButtonEvent {
        ButtonEvent {
            func: self.func,
            value: self.value,
            is_down: self.is_down,
            long_press: self.long_press,
            double_click: self.double_click,
        }
    }

    fn down(&mut self, now: Instant, double_click: Duration) -> Option<ButtonEvent> {
        // debounce
        if self.is_down {
            return None;
        }
        self.is_down = true;
        self.double_click = self
            .time_down
            .is_some_and(|t| now.saturating_duration_since(t) < double_click);
        self.time_down = Some(now);
        self.long_press = false;
        Some(self.event())
    }

    fn up(&mut self, now: Instant, long_press: Duration) -> Option<ButtonEvent> {
        if !self.is_down {
            return None;
        }
        self.is_down = false;
        self.long_press = self
            .time_down
            .is_some_and(|t| now.saturating_duration_since(t) > long_press);
        Some(self.event())
    }
}

/// The D-pad, treated as one button with eight values.
#[derive(Debug, Clone)]
struct Hat {
    up: bool,
    down: bool,
    left: bool,
    right: bool,
    settle_at: Option<Instant>,
    button: ButtonState,
}

impl Hat {
    fn new() -> Self {
        Self {
            up: false,
            down: false,
            left: false,
            right: false,
            settle_at: None,
            button: ButtonState::new(ControlFunc::Preset, 0),
        }
    }

    fn set(&mut self, button: Button, held: bool, now: Instant) -> bool {
        let slot = match button {
            Button::DPadUp => &mut self.up,
            Button::DPadDown => &mut self.down,
            Button::DPadLeft => &mut self.left,
            Button::DPadRight => &mut self.right,
            _ => return false,
        };
        *slot = held;
        self.settle_at = Some(now + HAT_SETTLE);
        true
    }

    fn position(&self) -> (i8, i8) {
        let x = i8::from(self.right) - i8::from(self.left);
        let y = i8::from(self.up) - i8::from(self.down);
        (x, y)
    }
}

/// Preset number for a hat position, clockwise from up.
pub fn hat_value(position: (i8, i8)) -> Option<u8> {
    match position {
        (0, 1) => Some(1),
        (1, 1) => Some(2),
        (1, 0) => Some(3),
        (1, -1) => Some(4),
        (0, -1) => Some(5),
        (-1, -1) => Some(6),
        (-1, 0) => Some(7),
        (-1, 1) => Some(8),
        _ => None,
    }
}

pub struct Controller {
    long_press: Duration,
    double_click: Duration,
    name: Option<String>,
    buttons: HashMap<Button, ButtonState>,
    axes: HashMap<Axis, (ControlFunc, f32)>,
    hat: Hat,
}

impl Controller {
    pub fn new(long_press: Duration, double_click: Duration) -> Self {
        Self {
            long_press,
            double_click,
            name: None,
            buttons: HashMap::new(),
            axes: HashMap::new(),
            hat: Hat::new(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_attached(&self) -> bool {
        self.name.is_some()
    }

    /// Sets up the layout for a newly connected controller.
    pub fn attach(&mut self, name: impl Into<String>) {
        self.detach();
        self.name = Some(name.into());
        self.buttons = BUTTON_LAYOUT
            .iter()
            .map(|&(button, func, value)| (button, ButtonState::new(func, value)))
            .collect();
        self.axes = AXIS_LAYOUT
            .iter()
            .map(|&(axis, func)| (axis, (func, 0.0)))
            .collect();
    }

    /// Drops all per-controller state after a removal.
    pub fn detach(&mut self) {
        self.name = None;
        self.buttons.clear();
        self.axes.clear();
        self.hat = Hat::new();
    }

    /// Latest position of a mapped axis; 0 when unmapped or detached.
    pub fn axis_value(&self, axis: Axis) -> f32 {
        self.axes.get(&axis).map_or(0.0, |&(_, value)| value)
    }

    pub fn handle(&mut self, event: InputEvent, now: Instant) -> Option<ControlEvent> {
        if !self.is_attached() {
            return None;
        }

        match event {
            InputEvent::Pressed(button) | InputEvent::Released(button) => {
                let held = matches!(event, InputEvent::Pressed(_));
                if self.hat.set(button, held, now) {
                    return None;
                }
                let state = self.buttons.get_mut(&button)?;
                if state.func == ControlFunc::None {
                    return None;
                }
                let event = if held {
                    state.down(now, self.double_click)
                } else {
                    state.up(now, self.long_press)
                };
                event.map(ControlEvent::Button)
            }
            InputEvent::Moved(axis, value) => {
                let (func, current) = self.axes.get_mut(&axis)?;
                *current = value;
                if *func == ControlFunc::None {
                    return None;
                }
                Some(ControlEvent::Axis { func: *func, axis })
            }
        }
    }

    /// When the pending D-pad change should be sampled.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.hat.settle_at
    }

    /// Samples the D-pad once it has settled.
    pub fn poll(&mut self, now: Instant) -> Option<ControlEvent> {
        let settle_at = self.hat.settle_at?;
        if now < settle_at || !self.is_attached() {
            return None;
        }
        self.hat.settle_at = None;

        let event = match hat_value(self.hat.position()) {
            Some(value) => {
                self.hat.button.value = value;
                self.hat.button.down(now, self.double_click)
            }
            None => self.hat.button.up(now, self.long_press),
        };
        event.map(ControlEvent::Button)
    }
}
