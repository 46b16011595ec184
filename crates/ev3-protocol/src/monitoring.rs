//! Background polling of registered devices.
//!
//! The brick pushes nothing on its own, every reading has to be asked
//! for. A tokio task ticks at a base rate and re-issues the cached read
//! command for every port whose per-device interval has elapsed. Ticks
//! with an empty registry do nothing, so polling effectively begins once
//! the first scan answer arrives.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Context;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use ev3_transport::SharedTransport;

use crate::decode::BrickState;
use crate::metrics::MetricsHub;
use crate::opcode::CallbackType;
use crate::ports::InputPort;
use crate::types::{DeviceType, ReadKind};

/// Per-device-kind polling intervals in milliseconds.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitoringConfig {
    pub base_tick_ms: u64,
    pub color_ms: u64,
    pub gyro_ms: u64,
    pub ir_ms: u64,
    pub ultrasonic_ms: u64,
    pub touch_ms: u64,
    pub motor_ms: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            base_tick_ms: 50,
            color_ms: 200,
            gyro_ms: 150,
            ir_ms: 200,
            ultrasonic_ms: 200,
            touch_ms: 500,
            motor_ms: 2000,
        }
    }
}

impl MonitoringConfig {
    pub fn interval_for(&self, device_type: DeviceType) -> Duration {
        let ms = match device_type {
            DeviceType::ColAmbient | DeviceType::ColColor | DeviceType::ColReflect => {
                self.color_ms
            }
            DeviceType::GyroAng | DeviceType::GyroRate => self.gyro_ms,
            DeviceType::IrProx | DeviceType::IrRemote | DeviceType::IrSeek => self.ir_ms,
            DeviceType::UsDistCm | DeviceType::UsDistIn | DeviceType::UsListen => {
                self.ultrasonic_ms
            }
            DeviceType::Touch => self.touch_ms,
            DeviceType::LMotorDeg
            | DeviceType::LMotorRot
            | DeviceType::MMotorDeg
            | DeviceType::MMotorRot => self.motor_ms,
        };
        Duration::from_millis(ms)
    }
}

/// Load polling intervals from a YAML file.
pub fn load_config_file(path: &Path) -> anyhow::Result<MonitoringConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading monitoring config {}", path.display()))?;
    let config: MonitoringConfig = serde_yaml::from_str(&text)
        .with_context(|| format!("parsing monitoring config {}", path.display()))?;
    Ok(config)
}

/// One synchronous polling step, separated from the timer so it can be
/// driven deterministically.
pub struct Poller {
    config: MonitoringConfig,
    last_polled: HashMap<InputPort, Instant>,
}

impl Poller {
    pub fn new(config: MonitoringConfig) -> Self {
        Self {
            config,
            last_polled: HashMap::new(),
        }
    }

    /// Collect the read frames due at `now` and claim their pending keys.
    /// The caller sends them after this returns, the state lock is never
    /// held while talking to the transport.
    pub fn poll_due(&mut self, now: Instant, state: &Mutex<BrickState>) -> Vec<Vec<u8>> {
        let Ok(mut state) = state.lock() else {
            warn!("brick state lock poisoned, skipping poll");
            return Vec::new();
        };
        let due: Vec<(InputPort, DeviceType, u8)> = state
            .registry
            .ports()
            .filter(|(port, device)| {
                self.last_polled.get(port).map_or(true, |at| {
                    now.duration_since(*at) >= self.config.interval_for(device.device_type)
                })
            })
            .map(|(port, device)| (port, device.device_type, device.mode))
            .collect();
        let mut frames = Vec::with_capacity(due.len());
        for (port, device_type, mode) in due {
            let kind = device_type.read_kind();
            let frame = match kind {
                ReadKind::Raw => state.commands.get_sensor_data(port, mode),
                ReadKind::Pct => state.commands.get_sensor_data_pct(port, mode),
                ReadKind::Si => state.commands.get_sensor_data_si(port, mode),
                ReadKind::Actor => state.commands.get_actor_data(port, mode),
            };
            match frame {
                Ok(frame) => {
                    // Re-polls replace a stale claim from a lost reply.
                    state.pending.begin_poll(callback_for(kind), port as u8);
                    self.last_polled.insert(port, now);
                    frames.push(frame);
                }
                Err(err) => debug!(%port, %err, "skipping poll read"),
            }
        }
        frames
    }

    /// A mode change invalidates the port's polling history.
    pub fn forget(&mut self, port: InputPort) {
        self.last_polled.remove(&port);
    }
}

fn callback_for(kind: ReadKind) -> CallbackType {
    match kind {
        ReadKind::Raw => CallbackType::DeviceRawValue,
        ReadKind::Pct => CallbackType::DevicePctValue,
        ReadKind::Si => CallbackType::DeviceSiValue,
        ReadKind::Actor => CallbackType::ActorValue,
    }
}

/// Owns the polling task. Started on connect, stopped on disconnect.
pub struct Monitoring {
    config: MonitoringConfig,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Monitoring {
    pub fn new(config: MonitoringConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Spawn the polling task on the current tokio runtime. Without a
    /// runtime the loop stays off and readings only arrive from explicit
    /// reads.
    pub fn start(
        &mut self,
        state: Arc<Mutex<BrickState>>,
        transport: SharedTransport,
        metrics: MetricsHub,
    ) {
        if self.is_running() {
            return;
        }
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!("no tokio runtime, device monitoring disabled");
                return;
            }
        };
        self.running.store(true, Ordering::Relaxed);
        let running = Arc::clone(&self.running);
        let config = self.config.clone();
        info!(base_tick_ms = config.base_tick_ms, "starting device monitoring");
        self.handle = Some(runtime.spawn(async move {
            let mut poller = Poller::new(config.clone());
            let mut tick = tokio::time::interval(Duration::from_millis(config.base_tick_ms));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            while running.load(Ordering::Relaxed) {
                tick.tick().await;
                let frames = poller.poll_due(Instant::now(), &state);
                if frames.is_empty() {
                    continue;
                }
                let Ok(mut transport) = transport.lock() else {
                    warn!("transport lock poisoned, stopping monitoring");
                    running.store(false, Ordering::Relaxed);
                    break;
                };
                for frame in frames {
                    match transport.send(&frame) {
                        Ok(()) => metrics.protocol.tx_buffers.inc(),
                        Err(err) => debug!(%err, "poll send failed"),
                    }
                }
            }
        }));
    }

    pub fn stop(&mut self) {
        if self.is_running() {
            info!("stopping device monitoring");
        }
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for Monitoring {
    fn drop(&mut self) {
        self.stop();
    }
}
