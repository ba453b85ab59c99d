use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

mod app;
mod camera;
mod companion;
mod config;
mod controller;
mod gamepad;
mod osc;
mod sensitivity;

use app::{AppEvent, Command, CommandProcessor, Connector};
use camera::{Camera, ViscaCamera};
use config::{CameraAddress, Settings};
use gamepad::GamepadListener;
use osc::OscServer;

#[derive(Parser)]
#[command(name = "visca-game-controller")]
#[command(about = "Drive VISCA over IP PTZ cameras from a game controller")]
#[command(version = version_info::current().product_version)]
struct Cli {
    #[arg(long, global = true, help = "Settings file (defaults to the user config dir)")]
    config: Option<PathBuf>,

    #[arg(long, global = true, help = "Enable debug logging")]
    debug: bool,

    #[arg(long, global = true, help = "Log level: trace, debug, info, warn, error, off")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the controller (default)
    Run,
    /// Change saved settings
    Configure(ConfigureArgs),
    /// Print the effective settings as JSON
    ShowConfig,
    /// Print version metadata as JSON
    Version,
}

#[derive(Args)]
struct ConfigureArgs {
    #[arg(
        long = "camera",
        value_name = "N=HOST[:PORT]",
        value_parser = config::parse_camera_assignment,
        help = "Camera address, one-based; may be repeated"
    )]
    cameras: Vec<(usize, CameraAddress)>,

    #[arg(long, help = "Point every camera at a local visca-relay")]
    relay: bool,

    #[arg(long, value_name = "SECS")]
    long_press: Option<f64>,

    #[arg(long, value_name = "SECS")]
    double_click: Option<f64>,

    #[arg(long)]
    companion_page: Option<u32>,

    #[arg(long)]
    companion_host: Option<String>,

    #[arg(long)]
    companion_port: Option<u16>,

    #[arg(long, help = "OSC listen port, 0 disables OSC")]
    osc_port: Option<u16>,

    #[arg(long)]
    invert_tilt: Option<bool>,

    #[arg(long)]
    swap_pan: Option<bool>,

    #[arg(long = "debug-mode")]
    debug_mode: Option<bool>,
}

fn apply(settings: &mut Settings, args: ConfigureArgs) {
    if args.relay {
        settings.use_relay();
    }
    for (number, address) in args.cameras {
        if settings.cameras.len() < number {
            settings
                .cameras
                .resize(number, CameraAddress::new("0.0.0.0", 0));
        }
        settings.cameras[number - 1] = address;
    }
    if let Some(secs) = args.long_press {
        settings.long_press_secs = secs;
    }
    if let Some(secs) = args.double_click {
        settings.double_click_secs = secs;
    }
    if let Some(page) = args.companion_page {
        settings.companion_page = page;
    }
    if let Some(host) = args.companion_host {
        settings.companion_host = host;
    }
    if let Some(port) = args.companion_port {
        settings.companion_port = port;
    }
    if let Some(port) = args.osc_port {
        settings.osc_port = port;
    }
    if let Some(invert) = args.invert_tilt {
        settings.invert_tilt = invert;
    }
    if let Some(swap) = args.swap_pan {
        settings.swap_pan = swap;
    }
    if let Some(debug) = args.debug_mode {
        settings.debug = debug;
    }
    settings.configured = true;
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn configure(mut settings: Settings, path: &Path, args: ConfigureArgs) -> Result<()> {
    apply(&mut settings, args);
    settings
        .save(path)
        .with_context(|| format!("failed to save settings to {}", path.display()))?;
    log::info!("settings saved to {}", path.display());
    print_json(&settings)
}

fn connect_visca(address: &CameraAddress) -> Result<Box<dyn Camera>, camera::ViscaError> {
    let camera = ViscaCamera::connect(&address.host, address.port)?;
    Ok(Box::new(camera))
}

fn run(settings: Settings, path: PathBuf) -> Result<()> {
    let descriptor = version_info::current();
    log::info!("{} {}", descriptor.description, descriptor.product_version);
    if !settings.configured {
        log::warn!(
            "no saved settings at {}; using defaults (see `configure`)",
            path.display()
        );
    }

    let (tx, rx) = crossbeam_channel::unbounded();

    // Commands from the host process arrive as JSON lines on stdin
    let stdin_tx = tx.clone();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Command>(&line) {
                Ok(command) => {
                    if stdin_tx.send(AppEvent::Command(command)).is_err() {
                        break;
                    }
                }
                Err(e) => log::warn!("Error parsing command: {}", e),
            }
        }
    });

    let mut gamepad = GamepadListener::spawn(tx.clone());
    let mut osc = match settings.osc_port {
        0 => None,
        port => match OscServer::spawn(port, tx.clone()) {
            Ok(server) => Some(server),
            Err(e) => {
                log::warn!("OSC disabled, cannot listen on port {}: {}", port, e);
                None
            }
        },
    };
    drop(tx);

    let connect: Connector = Box::new(connect_visca);
    let mut processor = CommandProcessor::new(rx, settings, path, connect, io::stdout())
        .context("failed to open the Companion socket")?;

    let shutdown = processor.shutdown_flag();
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&shutdown))
            .context("failed to register signal handler")?;
    }

    processor.run();

    gamepad.shutdown();
    if let Some(server) = osc.as_mut() {
        server.shutdown();
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let path = cli.config.clone().unwrap_or_else(config::default_path);

    let loaded = Settings::load(&path);
    let debug = cli.debug || loaded.as_ref().is_ok_and(|s| s.debug);
    visca_logging::init("visca-game-controller", cli.log_level.as_deref(), debug);
    let settings =
        loaded.with_context(|| format!("failed to load settings from {}", path.display()))?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(settings, path),
        Commands::Configure(args) => configure(settings, &path, args),
        Commands::ShowConfig => print_json(&settings),
        Commands::Version => print_json(version_info::current()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["visca-game-controller"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    fn configure_args(args: &[&str]) -> ConfigureArgs {
        let mut argv = vec!["configure"];
        argv.extend_from_slice(args);
        match parse(&argv).command {
            Some(Commands::Configure(args)) => args,
            _ => panic!("expected configure"),
        }
    }

    #[test]
    fn run_is_the_default_command() {
        let cli = parse(&["--debug"]);
        assert!(cli.command.is_none());
        assert!(cli.debug);
    }

    #[test]
    fn configure_sets_cameras_and_options() {
        let mut settings = Settings::default();
        apply(
            &mut settings,
            configure_args(&[
                "--camera",
                "2=10.0.0.2:5678",
                "--camera",
                "6=cam6",
                "--long-press",
                "1.5",
                "--invert-tilt",
                "true",
                "--osc-port",
                "0",
            ]),
        );

        assert_eq!(settings.cameras.len(), 6);
        assert_eq!(settings.cameras[1], CameraAddress::new("10.0.0.2", 5678));
        assert_eq!(settings.cameras[5], CameraAddress::new("cam6", config::VISCA_PORT));
        assert!(!settings.cameras[4].is_configured());
        assert_eq!(settings.long_press_secs, 1.5);
        assert!(settings.invert_tilt);
        assert_eq!(settings.osc_port, 0);
        assert!(settings.configured);
    }

    #[test]
    fn explicit_cameras_override_relay() {
        let mut settings = Settings::default();
        apply(
            &mut settings,
            configure_args(&["--relay", "--camera", "1=192.168.1.50"]),
        );
        assert_eq!(settings.cameras[0].host, "192.168.1.50");
        assert_eq!(settings.cameras[1], CameraAddress::new("127.0.0.1", 10002));
    }

    #[test]
    fn bad_camera_assignment_is_rejected() {
        let argv = ["visca-game-controller", "configure", "--camera", "0=host"];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn configure_saves_settings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        configure(
            Settings::default(),
            &path,
            configure_args(&["--companion-page", "12"]),
        )
        .unwrap();

        let saved = Settings::load(&path).unwrap();
        assert_eq!(saved.companion_page, 12);
        assert!(saved.configured);
    }

    #[test]
    fn invalid_configuration_is_not_saved() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let result = configure(
            Settings::default(),
            &path,
            configure_args(&["--long-press", "0"]),
        );
        assert!(result.is_err());
        assert!(!path.exists());
    }
}
