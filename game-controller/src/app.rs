use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::camera::{Camera, ExposureMode, FocusMode, ViscaError, WhiteBalanceMode};
use crate::companion::Companion;
use crate::config::{CameraAddress, Settings, SpeedAxis, CREDITS_TEXT};
use crate::controller::{
    Axis, ButtonEvent, ControlEvent, ControlFunc, Controller, InputEvent, HELP_TEXT,
};
use crate::osc::OscRequest;
use crate::sensitivity::joy_to_speed;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
const MAX_WAIT: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command")]
pub enum Command {
    #[serde(rename = "select-camera")]
    SelectCamera { camera: i64 },
    #[serde(rename = "help")]
    Help,
    #[serde(rename = "credits")]
    Credits,
    #[serde(rename = "reload-config")]
    ReloadConfig,
    #[serde(rename = "status")]
    Status,
    #[serde(rename = "quit")]
    Quit,
}

#[derive(Debug)]
pub enum AppEvent {
    Input(InputEvent, Instant),
    GamepadConnected(String),
    GamepadDisconnected,
    Command(Command),
    Osc(OscRequest),
    Shutdown,
}

pub type Connector =
    Box<dyn FnMut(&CameraAddress) -> Result<Box<dyn Camera>, ViscaError> + Send>;

fn controller_for(settings: &Settings) -> Controller {
    Controller::new(
        Duration::from_secs_f64(settings.long_press_secs),
        Duration::from_secs_f64(settings.double_click_secs),
    )
}

pub struct CommandProcessor<W: Write> {
    rx: Receiver<AppEvent>,
    settings: Settings,
    settings_path: PathBuf,
    controller: Controller,
    companion: Companion,
    connect: Connector,
    camera: Option<Box<dyn Camera>>,
    camera_num: Option<usize>,
    moving: bool,
    zooming: bool,
    focusing: bool,
    shutdown: Arc<AtomicBool>,
    heartbeat_id: u64,
    out: W,
}

impl<W: Write> CommandProcessor<W> {
    pub fn new(
        rx: Receiver<AppEvent>,
        settings: Settings,
        settings_path: PathBuf,
        connect: Connector,
        out: W,
    ) -> io::Result<Self> {
        let companion = Companion::new(settings.companion_host.clone(), settings.companion_port)?;
        Ok(Self {
            rx,
            controller: controller_for(&settings),
            settings,
            settings_path,
            companion,
            connect,
            camera: None,
            camera_num: None,
            moving: false,
            zooming: false,
            focusing: false,
            shutdown: Arc::new(AtomicBool::new(false)),
            heartbeat_id: 0,
            out,
        })
    }

    /// Flag that stops [`run`](Self::run) when raised, e.g. by a signal handler.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn camera_num(&self) -> Option<usize> {
        self.camera_num
    }

    pub fn run(&mut self) {
        self.connect_to_camera(1);

        let mut next_heartbeat = Instant::now() + HEARTBEAT_INTERVAL;
        while !self.shutdown.load(Ordering::Relaxed) {
            let now = Instant::now();
            let mut deadline = next_heartbeat.min(now + MAX_WAIT);
            if let Some(hat) = self.controller.next_deadline() {
                deadline = deadline.min(hat);
            }

            match self.rx.recv_deadline(deadline) {
                Ok(event) => {
                    if !self.handle_event(event) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            let now = Instant::now();
            if let Some(event) = self.controller.poll(now) {
                self.dispatch(event);
            }
            if now >= next_heartbeat {
                self.heartbeat_id += 1;
                self.emit(json!({ "type": "heartbeat_ping", "id": self.heartbeat_id.to_string() }));
                next_heartbeat = now + HEARTBEAT_INTERVAL;
            }
        }

        self.disconnect_camera();
        log::info!("exiting");
    }

    /// Handles one event; returns `false` when the processor should stop.
    pub fn handle_event(&mut self, event: AppEvent) -> bool {
        match event {
            AppEvent::Input(input, at) => {
                if let Some(event) = self.controller.handle(input, at) {
                    self.dispatch(event);
                }
            }
            AppEvent::GamepadConnected(name) => {
                log::info!("{}", name);
                self.controller.attach(name.clone());
                self.emit(json!({ "type": "controller", "connected": true, "name": name }));
            }
            AppEvent::GamepadDisconnected => {
                log::info!("No joystick");
                self.controller.detach();
                self.stop_motion();
                self.emit(json!({ "type": "controller", "connected": false }));
            }
            AppEvent::Command(command) => return self.handle_command(command),
            AppEvent::Osc(OscRequest::SelectCamera(camera)) => self.select_camera(camera),
            AppEvent::Shutdown => return false,
        }
        true
    }

    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::SelectCamera { camera } => self.select_camera(camera),
            Command::Help => self.emit(json!({ "type": "help", "text": HELP_TEXT })),
            Command::Credits => self.emit(json!({ "type": "credits", "text": CREDITS_TEXT })),
            Command::ReloadConfig => self.reload_config(),
            Command::Status => {
                let version = version_info::current();
                let status = json!({
                    "type": "status",
                    "camera": self.camera_num,
                    "controller": self.controller.name(),
                    "program": version.description,
                    "version": version.product_version,
                });
                self.emit(status);
            }
            Command::Quit => return false,
        }
        true
    }

    fn reload_config(&mut self) {
        let settings = match Settings::load(&self.settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                log::error!("{}", e);
                self.emit(json!({ "type": "config", "reloaded": false, "error": e.to_string() }));
                return;
            }
        };
        match Companion::new(settings.companion_host.clone(), settings.companion_port) {
            Ok(companion) => self.companion = companion,
            Err(e) => log::warn!("companion socket: {}", e),
        }

        let name = self.controller.name().map(str::to_string);
        self.controller = controller_for(&settings);
        if let Some(name) = name {
            self.controller.attach(name);
        }
        self.settings = settings;
        log::info!("settings reloaded from {}", self.settings_path.display());
        self.emit(json!({ "type": "config", "reloaded": true }));
    }

    fn emit(&mut self, mut event: Value) {
        if let Some(fields) = event.as_object_mut() {
            fields.insert("timestamp".to_string(), json!(Utc::now().to_rfc3339()));
        }
        if let Err(e) = writeln!(self.out, "{}", event).and_then(|_| self.out.flush()) {
            log::error!("failed to write event: {}", e);
        }
    }

    /// Runs `op` on the current camera, logging failures. `false` when there
    /// is no camera or the command failed.
    fn with_camera<F>(&mut self, what: &str, op: F) -> bool
    where
        F: FnOnce(&mut dyn Camera) -> Result<(), ViscaError>,
    {
        let Some(camera) = self.camera.as_deref_mut() else {
            return false;
        };
        match op(camera) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("{} failed: {}", what, e);
                false
            }
        }
    }

    fn disconnect_camera(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            let _ = camera.zoom(0);
            let _ = camera.pantilt(0, 0);
            camera.close();
        }
        self.camera_num = None;
        self.moving = false;
        self.zooming = false;
        self.focusing = false;
    }

    fn connect_to_camera(&mut self, cam_num: usize) {
        self.disconnect_camera();

        let camera = match self.settings.cam_address(cam_num - 1).cloned() {
            Some(address) => match (self.connect)(&address) {
                Ok(camera) => Some(camera),
                Err(e) => {
                    log::warn!(
                        "Camera {} not available ({}:{}): {}",
                        cam_num,
                        address.host,
                        address.port,
                        e
                    );
                    None
                }
            },
            None => {
                log::warn!("Camera {} has no address configured", cam_num);
                None
            }
        };

        match camera {
            Some(camera) => {
                self.camera = Some(camera);
                self.camera_num = Some(cam_num);
                log::info!("Camera {}", cam_num);
                // Companion row 0, column n puts camera n in Preview
                self.companion
                    .pushbutton(self.settings.companion(0, cam_num as u32));
                self.emit(json!({ "type": "camera", "camera": cam_num }));
            }
            None => {
                log::info!("Camera Unknown");
                self.emit(json!({ "type": "camera", "camera": null }));
            }
        }
    }

    fn select_camera(&mut self, cam_num: i64) {
        match usize::try_from(cam_num) {
            Ok(n) if (1..=self.settings.num_cams()).contains(&n) => self.connect_to_camera(n),
            _ => log::warn!("Bad camera number {}", cam_num),
        }
    }

    fn stop_motion(&mut self) {
        if self.moving {
            self.with_camera("pan/tilt stop", |cam| cam.pantilt(0, 0));
        }
        if self.zooming {
            self.with_camera("zoom stop", |cam| cam.zoom(0));
        }
        if self.focusing {
            self.with_camera("focus stop", |cam| cam.manual_focus(0));
        }
        self.moving = false;
        self.zooming = false;
        self.focusing = false;
    }

    fn dispatch(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::Button(button) => match button.func {
                ControlFunc::CameraSelect => self.handle_select_cam(button),
                ControlFunc::BrightnessUp => self.handle_brightness(button, true),
                ControlFunc::BrightnessDown => self.handle_brightness(button, false),
                ControlFunc::Preset => self.handle_preset(button),
                ControlFunc::Prev2Prog => self.handle_prev2prog(button),
                ControlFunc::AutoFocus => self.handle_autofocus(button),
                ControlFunc::WhiteBalance => self.handle_white_balance(button),
                _ => {}
            },
            ControlEvent::Axis { func, .. } => match func {
                ControlFunc::PanTilt => self.handle_pantilt(),
                ControlFunc::Zoom => self.handle_zoom(),
                ControlFunc::FocusNear => self.handle_focus(Axis::LeftTrigger, false),
                ControlFunc::FocusFar => self.handle_focus(Axis::RightTrigger, true),
                _ => {}
            },
        }
    }

    /// Acts on release; a long press selects the second bank (5-8).
    fn handle_select_cam(&mut self, button: ButtonEvent) {
        if button.is_down {
            return;
        }
        let mut cam_num = i64::from(button.value);
        if button.long_press {
            cam_num += 4;
        }
        self.select_camera(cam_num);
    }

    fn handle_prev2prog(&mut self, button: ButtonEvent) {
        if !button.is_down {
            return;
        }
        // Companion row 1, column 1 fades Preview to Program
        log::info!("Preview to Program");
        self.companion.pushbutton(self.settings.companion(1, 1));
        self.emit(json!({ "type": "program" }));
    }

    /// Short press recalls, long press saves. Acts on release.
    fn handle_preset(&mut self, button: ButtonEvent) {
        if button.is_down || self.camera.is_none() || button.value == 0 {
            return;
        }
        let preset = button.value;
        let (action, ok) = if button.long_press {
            log::info!("Setting preset {}", preset);
            ("save", self.with_camera("Preset", |cam| cam.save_preset(preset - 1)))
        } else {
            log::info!("Preset {}", preset);
            ("recall", self.with_camera("Preset", |cam| cam.recall_preset(preset - 1)))
        };
        if ok {
            self.emit(json!({ "type": "preset", "action": action, "preset": preset }));
        }
    }

    /// One exposure compensation step per press, in auto exposure mode.
    fn handle_brightness(&mut self, button: ButtonEvent, up: bool) {
        if !button.is_down {
            return;
        }
        let ok = self.with_camera("brightness change", |cam| {
            cam.autoexposure_mode(ExposureMode::Auto)?;
            if up {
                cam.increase_exposure_compensation()
            } else {
                cam.decrease_exposure_compensation()
            }
        });
        if ok {
            let direction = if up { "increase" } else { "decrease" };
            log::info!("{} brightness", direction);
            self.emit(json!({ "type": "brightness", "direction": direction }));
        }
    }

    fn handle_autofocus(&mut self, button: ButtonEvent) {
        if !button.is_down {
            return;
        }
        if self.with_camera("autofocus", |cam| cam.set_focus_mode(FocusMode::Auto)) {
            self.focusing = false;
            log::info!("AutoFocus mode");
            self.emit(json!({ "type": "focus", "mode": "auto" }));
        }
    }

    /// Short press: one push white balance. Long press: auto.
    fn handle_white_balance(&mut self, button: ButtonEvent) {
        if button.is_down {
            return;
        }
        let (mode, ok) = if button.long_press {
            log::info!("Auto white balance");
            (
                "auto",
                self.with_camera("white balance", |cam| {
                    cam.white_balance_mode(WhiteBalanceMode::Auto)
                }),
            )
        } else {
            log::info!("One Push white balance");
            (
                "one push",
                self.with_camera("white balance", |cam| {
                    cam.white_balance_mode(WhiteBalanceMode::OnePush)?;
                    cam.white_balance_mode(WhiteBalanceMode::OnePushTrigger)
                }),
            )
        };
        if ok {
            self.emit(json!({ "type": "white_balance", "mode": mode }));
        }
    }

    fn speed(&self, axis: Axis, table: SpeedAxis, invert: bool) -> i32 {
        let position = f64::from(self.controller.axis_value(axis));
        let speed = joy_to_speed(position, self.settings.sensitivity(table), invert);
        if self.settings.debug {
            log::debug!("joystick {:?}: {} -> {}", axis, position, speed);
        }
        speed
    }

    /// Pan and tilt go out together, so either stick axis triggers both.
    fn handle_pantilt(&mut self) {
        if self.camera.is_none() {
            return;
        }
        let pan = self.speed(Axis::LeftStickX, SpeedAxis::Pan, self.settings.swap_pan);
        let tilt = self.speed(Axis::LeftStickY, SpeedAxis::Tilt, self.settings.invert_tilt);

        // Pads can keep sending axis events at rest; only the first stop goes out.
        if self.moving || pan != 0 || tilt != 0 {
            self.with_camera("pan/tilt", |cam| cam.pantilt(pan, tilt));
        }
        self.moving = pan != 0 || tilt != 0;
    }

    /// Stick up zooms in.
    fn handle_zoom(&mut self) {
        if self.camera.is_none() {
            return;
        }
        let zoom = self.speed(Axis::RightStickY, SpeedAxis::Zoom, false);
        if self.zooming || zoom != 0 {
            self.with_camera("zoom", |cam| cam.zoom(zoom));
        }
        self.zooming = zoom != 0;
    }

    /// Trigger depth sets the manual focus speed; near is negative.
    fn handle_focus(&mut self, trigger: Axis, far: bool) {
        if self.camera.is_none() {
            return;
        }
        let speed = self.speed(trigger, SpeedAxis::Focus, !far);
        if !self.focusing && speed == 0 {
            return;
        }

        if speed == 0 {
            self.with_camera("manual focus", |cam| cam.manual_focus(0));
            log::info!("Manual focus: stop");
            self.emit(json!({ "type": "focus", "mode": "manual", "moving": false }));
        } else {
            let starting = !self.focusing;
            let ok = self.with_camera("manual focus", |cam| {
                if starting {
                    cam.set_focus_mode(FocusMode::Manual)?;
                }
                cam.manual_focus(speed)
            });
            if ok && starting {
                let direction = if far { "far" } else { "near" };
                log::info!("Manual focus {}: start", direction);
                self.emit(json!({
                    "type": "focus",
                    "mode": "manual",
                    "moving": true,
                    "direction": direction,
                }));
            }
        }
        self.focusing = speed != 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::Button;
    use std::net::UdpSocket;
    use std::sync::Mutex;

    type Calls = Arc<Mutex<Vec<String>>>;

    struct MockCamera {
        host: String,
        calls: Calls,
        fail: bool,
    }

    impl MockCamera {
        fn record(&mut self, call: String) -> Result<(), ViscaError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{} {}", self.host, call));
            if self.fail {
                Err(ViscaError::NotExecutable)
            } else {
                Ok(())
            }
        }
    }

    impl Camera for MockCamera {
        fn pantilt(&mut self, pan: i32, tilt: i32) -> Result<(), ViscaError> {
            self.record(format!("pantilt {} {}", pan, tilt))
        }
        fn zoom(&mut self, speed: i32) -> Result<(), ViscaError> {
            self.record(format!("zoom {}", speed))
        }
        fn manual_focus(&mut self, speed: i32) -> Result<(), ViscaError> {
            self.record(format!("focus {}", speed))
        }
        fn set_focus_mode(&mut self, mode: FocusMode) -> Result<(), ViscaError> {
            self.record(format!("focus_mode {:?}", mode))
        }
        fn autoexposure_mode(&mut self, mode: ExposureMode) -> Result<(), ViscaError> {
            self.record(format!("exposure {:?}", mode))
        }
        fn increase_exposure_compensation(&mut self) -> Result<(), ViscaError> {
            self.record("expcomp up".to_string())
        }
        fn decrease_exposure_compensation(&mut self) -> Result<(), ViscaError> {
            self.record("expcomp down".to_string())
        }
        fn save_preset(&mut self, preset: u8) -> Result<(), ViscaError> {
            self.record(format!("save {}", preset))
        }
        fn recall_preset(&mut self, preset: u8) -> Result<(), ViscaError> {
            self.record(format!("recall {}", preset))
        }
        fn white_balance_mode(&mut self, mode: WhiteBalanceMode) -> Result<(), ViscaError> {
            self.record(format!("wb {:?}", mode))
        }
        fn close(&mut self) {
            let _ = self.record("close".to_string());
        }
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn events(&self) -> Vec<Value> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        }
    }

    struct Harness {
        processor: CommandProcessor<SharedBuf>,
        calls: Calls,
        out: SharedBuf,
        companion: UdpSocket,
        t0: Instant,
    }

    /// Camera 2 is `failing` (commands error), camera 3 is unreachable,
    /// camera 4 has no address.
    fn harness() -> Harness {
        let companion = UdpSocket::bind("127.0.0.1:0").unwrap();
        companion
            .set_read_timeout(Some(Duration::from_millis(500)))
            .unwrap();

        let mut settings = Settings::default();
        settings.companion_port = companion.local_addr().unwrap().port();
        settings.cameras = vec![
            CameraAddress::new("cam1", 52381),
            CameraAddress::new("failing", 52381),
            CameraAddress::new("unreachable", 52381),
            CameraAddress::new("0.0.0.0", 0),
        ];

        let calls: Calls = Arc::default();
        let connector_calls = Arc::clone(&calls);
        let connect: Connector = Box::new(move |address: &CameraAddress| {
            if address.host == "unreachable" {
                return Err(ViscaError::Timeout);
            }
            let camera: Box<dyn Camera> = Box::new(MockCamera {
                host: address.host.clone(),
                calls: Arc::clone(&connector_calls),
                fail: address.host == "failing",
            });
            Ok(camera)
        });

        let out = SharedBuf::default();
        let (_tx, rx) = crossbeam_channel::unbounded();
        let mut processor =
            CommandProcessor::new(rx, settings, PathBuf::from("unused.json"), connect, out.clone())
                .unwrap();
        processor.handle_event(AppEvent::GamepadConnected("Test Pad".to_string()));

        Harness {
            processor,
            calls,
            out,
            companion,
            t0: Instant::now(),
        }
    }

    impl Harness {
        fn at(&self, millis: u64) -> Instant {
            self.t0 + Duration::from_millis(millis)
        }

        fn input(&mut self, input: InputEvent, millis: u64) {
            let at = self.at(millis);
            self.processor.handle_event(AppEvent::Input(input, at));
        }

        /// Samples the D-pad as the run loop does once it has settled.
        fn settle(&mut self, millis: u64) {
            let at = self.at(millis);
            if let Some(event) = self.processor.controller.poll(at) {
                self.processor.dispatch(event);
            }
        }

        fn click(&mut self, button: Button, start: u64, held: u64) {
            self.input(InputEvent::Pressed(button), start);
            self.input(InputEvent::Released(button), start + held);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn clear_calls(&self) {
            self.calls.lock().unwrap().clear();
        }

        fn companion_message(&self) -> String {
            let mut buf = [0u8; 64];
            let (len, _) = self.companion.recv_from(&mut buf).unwrap();
            String::from_utf8_lossy(&buf[..len]).to_string()
        }

        fn with_cam1(mut self) -> Self {
            self.processor.handle_event(AppEvent::Command(Command::SelectCamera { camera: 1 }));
            self.companion_message();
            self.clear_calls();
            self
        }
    }

    #[test]
    fn commands_parse_from_json_lines() {
        let command: Command =
            serde_json::from_str(r#"{"command":"select-camera","camera":2}"#).unwrap();
        assert_eq!(command, Command::SelectCamera { camera: 2 });
        let command: Command = serde_json::from_str(r#"{"command":"quit"}"#).unwrap();
        assert_eq!(command, Command::Quit);
        assert!(serde_json::from_str::<Command>(r#"{"command":"dance"}"#).is_err());
    }

    #[test]
    fn camera_button_selects_on_release_and_pushes_preview() {
        let mut h = harness();
        h.input(InputEvent::Pressed(Button::South), 0);
        assert_eq!(h.processor.camera_num(), None);
        h.input(InputEvent::Released(Button::South), 100);
        assert_eq!(h.processor.camera_num(), Some(1));
        assert_eq!(h.companion_message(), "LOCATION 99/0/1 PRESS");

        let events = h.out.events();
        let last = events.last().unwrap();
        assert_eq!(last["type"], "camera");
        assert_eq!(last["camera"], 1);
        assert!(last["timestamp"].is_string());
    }

    #[test]
    fn switching_cameras_stops_and_closes_the_previous_one() {
        let mut h = harness().with_cam1();
        h.click(Button::East, 0, 100);
        assert_eq!(h.processor.camera_num(), Some(2));
        assert_eq!(
            h.calls(),
            vec!["cam1 zoom 0", "cam1 pantilt 0 0", "cam1 close"]
        );
    }

    #[test]
    fn long_press_selects_second_bank_which_is_out_of_range() {
        let mut h = harness().with_cam1();
        h.click(Button::South, 0, 2500);
        // camera 5 does not exist; the current camera stays selected
        assert_eq!(h.processor.camera_num(), Some(1));
        assert!(h.calls().is_empty());
    }

    #[test]
    fn unavailable_camera_leaves_none_selected() {
        let mut h = harness().with_cam1();
        h.click(Button::West, 0, 100);
        assert_eq!(h.processor.camera_num(), None);
        let events = h.out.events();
        assert_eq!(events.last().unwrap()["camera"], Value::Null);

        h.click(Button::North, 200, 100);
        assert_eq!(h.processor.camera_num(), None);
    }

    #[test]
    fn osc_and_stdin_select_cameras_with_bounds() {
        let mut h = harness();
        h.processor.handle_event(AppEvent::Osc(OscRequest::SelectCamera(2)));
        assert_eq!(h.processor.camera_num(), Some(2));
        h.processor.handle_event(AppEvent::Osc(OscRequest::SelectCamera(0)));
        h.processor.handle_event(AppEvent::Command(Command::SelectCamera { camera: 9 }));
        assert_eq!(h.processor.camera_num(), Some(2));
    }

    #[test]
    fn stick_click_fades_preview_to_program() {
        let mut h = harness();
        h.input(InputEvent::Pressed(Button::RightThumb), 0);
        assert_eq!(h.companion_message(), "LOCATION 99/1/1 PRESS");
        assert_eq!(h.out.events().last().unwrap()["type"], "program");
    }

    #[test]
    fn dpad_recalls_and_saves_presets() {
        let mut h = harness().with_cam1();

        h.input(InputEvent::Pressed(Button::DPadRight), 0);
        h.settle(100);
        h.input(InputEvent::Released(Button::DPadRight), 300);
        h.settle(400);
        assert_eq!(h.calls(), vec!["cam1 recall 2"]);

        h.clear_calls();
        h.input(InputEvent::Pressed(Button::DPadUp), 1000);
        h.settle(1100);
        h.input(InputEvent::Released(Button::DPadUp), 4000);
        h.settle(4100);
        assert_eq!(h.calls(), vec!["cam1 save 0"]);
    }

    #[test]
    fn brightness_uses_auto_exposure_then_compensation() {
        let mut h = harness().with_cam1();
        h.click(Button::RightBumper, 0, 50);
        h.click(Button::LeftBumper, 100, 50);
        assert_eq!(
            h.calls(),
            vec![
                "cam1 exposure Auto",
                "cam1 expcomp up",
                "cam1 exposure Auto",
                "cam1 expcomp down"
            ]
        );
    }

    #[test]
    fn white_balance_short_and_long_press() {
        let mut h = harness().with_cam1();
        h.click(Button::Select, 0, 100);
        h.click(Button::Select, 500, 2500);
        assert_eq!(
            h.calls(),
            vec!["cam1 wb OnePush", "cam1 wb OnePushTrigger", "cam1 wb Auto"]
        );
    }

    #[test]
    fn pantilt_sends_motion_then_a_single_stop() {
        let mut h = harness().with_cam1();
        h.input(InputEvent::Moved(Axis::LeftStickX, 1.0), 0);
        h.input(InputEvent::Moved(Axis::LeftStickY, -1.0), 10);
        h.input(InputEvent::Moved(Axis::LeftStickX, 0.0), 20);
        h.input(InputEvent::Moved(Axis::LeftStickY, 0.01), 30);
        h.input(InputEvent::Moved(Axis::LeftStickY, 0.0), 40);
        assert_eq!(
            h.calls(),
            vec![
                "cam1 pantilt 20 0",
                "cam1 pantilt 20 -18",
                "cam1 pantilt 0 -18",
                "cam1 pantilt 0 0"
            ]
        );
    }

    #[test]
    fn swap_pan_and_invert_tilt_flip_directions() {
        let mut h = harness().with_cam1();
        h.processor.settings.swap_pan = true;
        h.processor.settings.invert_tilt = true;
        h.input(InputEvent::Moved(Axis::LeftStickX, 1.0), 0);
        h.input(InputEvent::Moved(Axis::LeftStickY, 1.0), 10);
        assert_eq!(h.calls(), vec!["cam1 pantilt -20 0", "cam1 pantilt -20 -18"]);
    }

    #[test]
    fn stick_up_tilts_up_by_default() {
        let mut h = harness().with_cam1();
        assert!(!h.processor.settings.invert_tilt);
        h.input(InputEvent::Moved(Axis::LeftStickY, 1.0), 0);
        h.input(InputEvent::Moved(Axis::LeftStickY, 0.0), 10);
        assert_eq!(h.calls(), vec!["cam1 pantilt 0 18", "cam1 pantilt 0 0"]);
    }

    #[test]
    fn zoom_follows_right_stick() {
        let mut h = harness().with_cam1();
        h.input(InputEvent::Moved(Axis::RightStickY, 1.0), 0);
        h.input(InputEvent::Moved(Axis::RightStickY, 0.05), 10);
        h.input(InputEvent::Moved(Axis::RightStickY, 0.0), 20);
        assert_eq!(h.calls(), vec!["cam1 zoom 7", "cam1 zoom 0"]);
    }

    #[test]
    fn triggers_drive_manual_focus() {
        let mut h = harness().with_cam1();
        h.input(InputEvent::Moved(Axis::RightTrigger, 1.0), 0);
        h.input(InputEvent::Moved(Axis::RightTrigger, 0.0), 10);
        h.input(InputEvent::Moved(Axis::LeftTrigger, 1.0), 20);
        h.input(InputEvent::Moved(Axis::LeftTrigger, 0.0), 30);
        assert_eq!(
            h.calls(),
            vec![
                "cam1 focus_mode Manual",
                "cam1 focus 7",
                "cam1 focus 0",
                "cam1 focus_mode Manual",
                "cam1 focus -7",
                "cam1 focus 0"
            ]
        );
        let focus: Vec<Value> = h
            .out
            .events()
            .into_iter()
            .filter(|e| e["type"] == "focus")
            .collect();
        assert_eq!(focus[0]["direction"], "far");
        assert_eq!(focus[2]["direction"], "near");
    }

    #[test]
    fn autofocus_on_start_press() {
        let mut h = harness().with_cam1();
        h.input(InputEvent::Pressed(Button::Start), 0);
        assert_eq!(h.calls(), vec!["cam1 focus_mode Auto"]);
    }

    #[test]
    fn camera_errors_are_reported_not_fatal() {
        let mut h = harness();
        h.processor.handle_event(AppEvent::Command(Command::SelectCamera { camera: 2 }));
        h.companion_message();
        h.clear_calls();
        let before = h.out.events().len();

        h.click(Button::Start, 0, 50);
        h.input(InputEvent::Pressed(Button::DPadDown), 100);
        assert_eq!(h.calls(), vec!["failing focus_mode Auto"]);
        assert_eq!(h.out.events().len(), before);
    }

    #[test]
    fn no_camera_means_no_commands() {
        let mut h = harness();
        h.input(InputEvent::Moved(Axis::LeftStickX, 1.0), 0);
        h.click(Button::RightBumper, 10, 50);
        h.click(Button::Select, 100, 50);
        assert!(h.calls().is_empty());
    }

    #[test]
    fn disconnect_stops_motion_and_ignores_input() {
        let mut h = harness().with_cam1();
        h.input(InputEvent::Moved(Axis::RightStickY, -1.0), 0);
        h.processor.handle_event(AppEvent::GamepadDisconnected);
        h.input(InputEvent::Moved(Axis::RightStickY, 1.0), 10);
        assert_eq!(h.calls(), vec!["cam1 zoom -7", "cam1 zoom 0"]);
        assert_eq!(h.out.events().last().unwrap()["connected"], false);
    }

    #[test]
    fn status_help_and_quit() {
        let mut h = harness().with_cam1();
        assert!(h.processor.handle_event(AppEvent::Command(Command::Status)));
        let status = h.out.events().pop().unwrap();
        assert_eq!(status["camera"], 1);
        assert_eq!(status["controller"], "Test Pad");
        assert_eq!(status["version"], "1.0beta4");

        assert!(h.processor.handle_event(AppEvent::Command(Command::Help)));
        let help = h.out.events().pop().unwrap();
        assert!(help["text"].as_str().unwrap().contains("Pan & Tilt"));

        assert!(!h.processor.handle_event(AppEvent::Command(Command::Quit)));
        assert!(!h.processor.handle_event(AppEvent::Shutdown));
    }

    #[test]
    fn reload_config_applies_new_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut settings = Settings::default();
        settings.long_press_secs = 0.5;
        settings.companion_port = 1;
        settings.save(&path).unwrap();

        let mut h = harness().with_cam1();
        h.processor.settings_path = path;
        h.processor.handle_event(AppEvent::Command(Command::ReloadConfig));
        assert_eq!(h.out.events().pop().unwrap()["reloaded"], true);
        assert_eq!(h.processor.controller.name(), Some("Test Pad"));

        // 0.5s long press now selects the second bank
        h.click(Button::South, 0, 800);
        assert_eq!(h.processor.camera_num(), Some(1));
        h.click(Button::South, 1000, 100);
        assert_eq!(h.processor.camera_num(), Some(1));
        assert!(h.calls().contains(&"cam1 close".to_string()));
    }

    #[test]
    fn reload_config_reports_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();

        let mut h = harness();
        h.processor.settings_path = path;
        h.processor.handle_event(AppEvent::Command(Command::ReloadConfig));
        let event = h.out.events().pop().unwrap();
        assert_eq!(event["reloaded"], false);
        assert!(event["error"].is_string());
    }

    #[test]
    fn run_stops_on_quit_and_releases_the_camera() {
        let mut h = harness();
        let (tx, rx) = crossbeam_channel::unbounded();
        h.processor.rx = rx;
        tx.send(AppEvent::Command(Command::Quit)).unwrap();
        h.processor.run();
        assert_eq!(h.processor.camera_num(), None);
        assert_eq!(
            h.calls(),
            vec!["cam1 zoom 0", "cam1 pantilt 0 0", "cam1 close"]
        );
    }
}
