use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing::info;

use ev3_protocol::{
    load_config_file, Commands as Ev3Commands, DeviceEvent, Ev3Api, LedColor, LedMode,
    MonitoringConfig, OutputPorts,
};
use ev3_transport::{MockTransport, SharedTransport};

#[derive(Parser, Debug)]
#[command(
    name = "ev3",
    version,
    about = "LEGO Mindstorms EV3 protocol CLI",
    disable_help_subcommand = true
)]
struct Cli {
    /// Monitoring intervals YAML (defaults built in)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Color {
    Off,
    Green,
    Red,
    Orange,
}

impl From<Color> for LedColor {
    fn from(color: Color) -> Self {
        match color {
            Color::Off => LedColor::Off,
            Color::Green => LedColor::Green,
            Color::Red => LedColor::Red,
            Color::Orange => LedColor::Orange,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Mode {
    Normal,
    Flash,
    Pulse,
}

impl From<Mode> for LedMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Normal => LedMode::Normal,
            Mode::Flash => LedMode::Flash,
            Mode::Pulse => LedMode::Pulse,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a full simulated session against the mock transport
    Demo {
        /// Also dump prometheus metrics at the end
        #[arg(long, action = ArgAction::SetTrue)]
        metrics: bool,
    },
    /// Hex-dump the status LED command
    EncodeLed {
        #[arg(long, value_enum, default_value_t = Color::Green)]
        color: Color,
        #[arg(long, value_enum, default_value_t = Mode::Normal)]
        mode: Mode,
    },
    /// Hex-dump a tone command
    EncodeTone {
        #[arg(long, default_value_t = 440)]
        frequency: u16,
        #[arg(long, default_value_t = 200)]
        duration: u16,
        #[arg(long, default_value_t = 50)]
        volume: u8,
    },
    /// Hex-dump a motor power command
    EncodeMove {
        /// Output ports as a bitmask, A=1 B=2 C=4 D=8
        #[arg(long, default_value_t = 0x06)]
        ports: u8,
        #[arg(long, default_value_t = 50, allow_hyphen_values = true)]
        power: i8,
        #[arg(long, action = ArgAction::SetTrue)]
        brake: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config_file(path)?,
        None => MonitoringConfig::default(),
    };

    match cli.command {
        Command::Demo { metrics } => demo(config, metrics).await,
        Command::EncodeLed { color, mode } => {
            let commands = Ev3Commands::new();
            let frame = commands.set_led(color.into(), mode.into())?;
            println!("{}", hex(&frame));
            Ok(())
        }
        Command::EncodeTone {
            frequency,
            duration,
            volume,
        } => {
            let commands = Ev3Commands::new();
            let frame = commands.play_tone(frequency, duration, volume)?;
            println!("{}", hex(&frame));
            Ok(())
        }
        Command::EncodeMove { ports, power, brake } => {
            let ports = OutputPorts::from_bits(ports).context("invalid port bitmask")?;
            let commands = Ev3Commands::new();
            let frame = commands.move_power(ports, power, brake)?;
            println!("{}", hex(&frame));
            Ok(())
        }
    }
}

/// Simulated brick: connect, answer the scan, let the polling loop run
/// and feed it readings, then print what the session learned.
async fn demo(config: MonitoringConfig, metrics: bool) -> Result<()> {
    let mut api = Ev3Api::new(config)?;
    let brick = Arc::new(Mutex::new(MockTransport::new()));
    let shared: SharedTransport = brick.clone();
    let mut events = api.subscribe();

    api.connect(shared)?;
    info!(state = ?api.connection_state(), "connected to simulated brick");

    // The brick answers the preparation reads.
    inject(&brick, &frame(0x20, 0x00, b"V1.09H\0"));
    inject(&brick, &frame(0x21, 0x00, &[0x64]));
    inject(&brick, &frame(0x01, 0x00, b"COL-REFLECT\0"));
    inject(&brick, &frame(0x01, 0x01, b"TOUCH\0"));
    inject(&brick, &frame(0x01, 0x10, b"L-MOTOR-DEG\0"));

    // Give the polling loop a few ticks, then deliver readings.
    tokio::time::sleep(Duration::from_millis(120)).await;
    inject(&brick, &frame(0x11, 0x00, &[0x2A]));
    inject(&brick, &frame(0x10, 0x01, &[0x01]));
    inject(&brick, &frame(0x05, 0x10, &360i32.to_le_bytes()));
    tokio::time::sleep(Duration::from_millis(120)).await;

    println!("firmware: {}", api.firmware());
    println!("battery:  {:?}", api.battery());
    println!("devices:");
    for (port, device) in api.devices() {
        println!(
            "  port {port}: {} (mode {}) = {}",
            device.name, device.mode, device.value
        );
    }
    println!("events:");
    while let Ok(event) = events.try_recv() {
        match event {
            DeviceEvent::Attached { port, name } => println!("  attached {name} on port {port}"),
            DeviceEvent::Firmware(version) => println!("  firmware {version}"),
            DeviceEvent::Battery(data) => println!("  battery {data:?}"),
            other => println!("  {other:?}"),
        }
    }

    api.disconnect();
    info!(state = ?api.connection_state(), "session closed");
    if metrics {
        println!("{}", api.metrics_text());
    }
    Ok(())
}

fn frame(callback: u8, port: u8, payload: &[u8]) -> Vec<u8> {
    let len = payload.len() + 3;
    let mut frame = vec![(len & 0xFF) as u8, (len >> 8) as u8, callback, port, 0x02];
    frame.extend_from_slice(payload);
    frame
}

fn inject(brick: &Arc<Mutex<MockTransport>>, frame: &[u8]) {
    if let Ok(mut guard) = brick.lock() {
        guard.inject(frame);
    }
}

fn hex(frame: &[u8]) -> String {
    frame
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
