use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sensitivity::SensitivityTable;

pub const NUM_CAMS: usize = 4;
pub const VISCA_PORT: u16 = 52381;
pub const COMPANION_PORT: u16 = 16759;
pub const OSC_PORT: u16 = 9999;
pub const RELAY_BASE_PORT: u16 = 10000;

/// Upper bound for the long-press and double-click times.
pub const MAX_PRESS_SECS: f64 = 60.0;

const APP_DIR: &str = "visca-game-controller";
const SETTINGS_FILE: &str = "settings.json";

pub const CREDITS_TEXT: &str = "\
Dan Tappan (https://dantappan.net) - 2024

Derived from https://github.com/International-Anglican-Church/visca-joystick

VISCA Camera control: https://github.com/misterhay/VISCA-IP-Controller

Gamepad handling: gilrs (https://gitlab.com/gilrs-project/gilrs)

OSC: rosc (https://github.com/klingtnet/rosc)

Icon based on: https://www.flaticon.com/free-icon/gamepad_8037145 - created by Hilmy Abiyyu A
";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraAddress {
    pub host: String,
    pub port: u16,
}

impl CameraAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `0.0.0.0`, an empty host or port 0 mark an unused slot.
    pub fn is_configured(&self) -> bool {
        let host = self.host.trim();
        !host.is_empty() && host != "0.0.0.0" && self.port != 0
    }
}

impl Default for CameraAddress {
    fn default() -> Self {
        Self::new("127.0.0.1", VISCA_PORT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedAxis {
    Pan,
    Tilt,
    Zoom,
    Focus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityTables {
    pub pan: SensitivityTable,
    pub tilt: SensitivityTable,
    pub zoom: SensitivityTable,
    pub focus: SensitivityTable,
}

impl Default for SensitivityTables {
    fn default() -> Self {
        Self {
            pan: SensitivityTable::new(
                &[0.0, 0.05, 0.3, 0.7, 0.9, 1.0],
                &[0.0, 0.0, 2.0, 8.0, 15.0, 20.0],
            ),
            tilt: SensitivityTable::new(
                &[0.0, 0.07, 0.3, 0.65, 0.85, 1.0],
                &[0.0, 0.0, 3.0, 6.0, 14.0, 18.0],
            ),
            zoom: SensitivityTable::new(&[0.0, 0.1, 1.0], &[0.0, 0.0, 7.0]),
            focus: SensitivityTable::new(&[0.0, 0.1, 1.0], &[0.0, 0.0, 7.0]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub cameras: Vec<CameraAddress>,
    pub long_press_secs: f64,
    pub double_click_secs: f64,
    pub companion_page: u32,
    pub companion_host: String,
    pub companion_port: u16,
    pub osc_port: u16,
    pub invert_tilt: bool,
    pub swap_pan: bool,
    pub debug: bool,
    pub sensitivity: SensitivityTables,
    pub configured: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cameras: vec![CameraAddress::default(); NUM_CAMS],
            long_press_secs: 2.0,
            double_click_secs: 0.0,
            companion_page: 99,
            companion_host: "127.0.0.1".to_string(),
            companion_port: COMPANION_PORT,
            osc_port: OSC_PORT,
            invert_tilt: false,
            swap_pan: false,
            debug: false,
            sensitivity: SensitivityTables::default(),
            configured: false,
        }
    }
}

/// `<config dir>/visca-game-controller/settings.json`, or the working
/// directory when the platform has no config dir.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_default()
        .join(SETTINGS_FILE)
}

impl Settings {
    /// Loads settings, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let settings: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;

        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(write_err)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cameras.is_empty() {
            return Err(ConfigError::Invalid("no cameras configured".to_string()));
        }
        if !(self.long_press_secs > 0.0 && self.long_press_secs <= MAX_PRESS_SECS) {
            return Err(ConfigError::Invalid(format!(
                "long press time must be in (0, {}] seconds, got {}",
                MAX_PRESS_SECS, self.long_press_secs
            )));
        }
        if !(self.double_click_secs >= 0.0 && self.double_click_secs <= MAX_PRESS_SECS) {
            return Err(ConfigError::Invalid(format!(
                "double click time must be in [0, {}] seconds, got {}",
                MAX_PRESS_SECS, self.double_click_secs
            )));
        }
        let tables = [
            ("pan", &self.sensitivity.pan),
            ("tilt", &self.sensitivity.tilt),
            ("zoom", &self.sensitivity.zoom),
            ("focus", &self.sensitivity.focus),
        ];
        for (name, table) in tables {
            if !table.is_well_formed() {
                return Err(ConfigError::Invalid(format!(
                    "{} sensitivity table is malformed",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn num_cams(&self) -> usize {
        self.cameras.len()
    }

    /// Address of the camera at zero-based `index`, if that slot is in use.
    pub fn cam_address(&self, index: usize) -> Option<&CameraAddress> {
        self.cameras.get(index).filter(|cam| cam.is_configured())
    }

    /// Companion button location `(page, row, column)`.
    pub fn companion(&self, row: u32, column: u32) -> (u32, u32, u32) {
        (self.companion_page, row, column)
    }

    pub fn sensitivity(&self, axis: SpeedAxis) -> &SensitivityTable {
        match axis {
            SpeedAxis::Pan => &self.sensitivity.pan,
            SpeedAxis::Tilt => &self.sensitivity.tilt,
            SpeedAxis::Zoom => &self.sensitivity.zoom,
            SpeedAxis::Focus => &self.sensitivity.focus,
        }
    }

    /// Points every camera at a local `visca-relay` instance.
    pub fn use_relay(&mut self) {
        for (i, cam) in self.cameras.iter_mut().enumerate() {
            *cam = CameraAddress::new("127.0.0.1", RELAY_BASE_PORT + i as u16 + 1);
        }
    }
}

/// Parses `N=HOST:PORT` (or `N=HOST`, default VISCA port) with `N` one-based.
pub fn parse_camera_assignment(text: &str) -> Result<(usize, CameraAddress), String> {
    let (number, address) = text
        .split_once('=')
        .ok_or_else(|| format!("expected N=HOST[:PORT], got {:?}", text))?;
    let number: usize = number
        .trim()
        .parse()
        .map_err(|_| format!("bad camera number {:?}", number))?;
    if number == 0 {
        return Err("camera numbers start at 1".to_string());
    }

    let address = address.trim();
    let (host, port) = match address.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .map_err(|_| format!("bad port {:?}", port))?;
            (host, port)
        }
        None => (address, VISCA_PORT),
    };
    if host.is_empty() {
        return Err(format!("missing host in {:?}", text));
    }
    Ok((number, CameraAddress::new(host, port)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn missing_file_gives_unconfigured_defaults() {
        let dir = tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("settings.json")).unwrap();
        assert_eq!(settings, Settings::default());
        assert!(!settings.configured);
        assert_eq!(settings.num_cams(), 4);
        assert_eq!(settings.companion(0, 3), (99, 0, 3));
    }

    #[test]
    fn save_then_load_preserves_changes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut settings = Settings::default();
        settings.cameras[0] = CameraAddress::new("10.100.1.202", VISCA_PORT);
        settings.long_press_secs = 1.5;
        settings.invert_tilt = true;
        settings.configured = true;
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"companion_page": 12, "swap_pan": true}"#).unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.companion_page, 12);
        assert!(settings.swap_pan);
        assert_eq!(settings.long_press_secs, 2.0);
        assert_eq!(settings.sensitivity, SensitivityTables::default());
    }

    #[test]
    fn rejects_bad_json_and_bad_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Settings::load(&path), Err(ConfigError::Parse { .. })));

        fs::write(&path, r#"{"long_press_secs": 0}"#).unwrap();
        assert!(matches!(Settings::load(&path), Err(ConfigError::Invalid(_))));

        fs::write(&path, r#"{"cameras": []}"#).unwrap();
        assert!(matches!(Settings::load(&path), Err(ConfigError::Invalid(_))));

        fs::write(&path, r#"{"long_press_secs": 1e300}"#).unwrap();
        assert!(matches!(Settings::load(&path), Err(ConfigError::Invalid(_))));

        fs::write(&path, r#"{"double_click_secs": 61}"#).unwrap();
        assert!(matches!(Settings::load(&path), Err(ConfigError::Invalid(_))));

        let mut settings = Settings::default();
        settings.long_press_secs = 1e300;
        assert!(matches!(settings.save(&path), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn press_times_at_the_limit_are_accepted() {
        let mut settings = Settings::default();
        settings.long_press_secs = MAX_PRESS_SECS;
        settings.double_click_secs = MAX_PRESS_SECS;
        assert!(settings.validate().is_ok());
        assert_eq!(
            Duration::from_secs_f64(settings.long_press_secs),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn unused_camera_slots_have_no_address() {
        let mut settings = Settings::default();
        settings.cameras[2] = CameraAddress::new("0.0.0.0", 0);
        assert!(settings.cam_address(0).is_some());
        assert!(settings.cam_address(2).is_none());
        assert!(settings.cam_address(7).is_none());
    }

    #[test]
    fn relay_preset_targets_local_ports() {
        let mut settings = Settings::default();
        settings.use_relay();
        let ports: Vec<u16> = settings.cameras.iter().map(|c| c.port).collect();
        assert_eq!(ports, vec![10001, 10002, 10003, 10004]);
        assert!(settings.cameras.iter().all(|c| c.host == "127.0.0.1"));
    }

    #[test]
    fn parses_camera_assignments() {
        assert_eq!(
            parse_camera_assignment("2=10.100.1.116:52381").unwrap(),
            (2, CameraAddress::new("10.100.1.116", 52381))
        );
        assert_eq!(
            parse_camera_assignment("1=ptz-left").unwrap(),
            (1, CameraAddress::new("ptz-left", VISCA_PORT))
        );
        assert!(parse_camera_assignment("0=host").is_err());
        assert!(parse_camera_assignment("host:1").is_err());
        assert!(parse_camera_assignment("1=host:port").is_err());
        assert!(parse_camera_assignment("1=:52381").is_err());
    }
}
