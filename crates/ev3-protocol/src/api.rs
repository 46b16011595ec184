//! High-level brick session over any [`Transport`].
//!
//! [`Transport`]: ev3_transport::Transport

use std::sync::{Arc, Mutex};

use time::OffsetDateTime;
use tracing::{debug, error, info};

use ev3_transport::SharedTransport;

use crate::decode::{BrickState, ResponseDecoder};
use crate::error::{ProtocolError, Result};
use crate::events::{DeviceEvent, EventBus};
use crate::metrics::MetricsHub;
use crate::monitoring::{Monitoring, MonitoringConfig};
use crate::opcode::{CallbackType, LedColor, LedMode};
use crate::ports::{InputPort, OutputPorts};
use crate::types::{
    ColorSensorMode, Device, DeviceName, DeviceValue, IrSensorMode, ReadKind,
    UltrasonicSensorMode,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Prepared,
}

/// Fallback driving base when no motors have been scanned yet: large
/// motors on output ports B and C.
const DEFAULT_LEFT: OutputPorts = OutputPorts::B;
const DEFAULT_RIGHT: OutputPorts = OutputPorts::C;

/// Owns a brick session: connection state, the shared transport, the
/// decoded session state, the event bus and the polling loop.
///
/// Outgoing commands are fire-and-forget. With no transport attached, or
/// a disconnected one, a send is a debug-logged no-op, so user programs
/// keep running against a brick that went away.
pub struct Ev3Api {
    state: ConnectionState,
    transport: Option<SharedTransport>,
    brick: Arc<Mutex<BrickState>>,
    events: EventBus,
    metrics: MetricsHub,
    monitoring: Monitoring,
}

impl Ev3Api {
    pub fn new(config: MonitoringConfig) -> Result<Self> {
        let metrics = MetricsHub::new().map_err(|e| {
            error!(error = %e, "metrics registry init failed");
            ProtocolError::Internal("metrics registry init failed")
        })?;
        Ok(Self {
            state: ConnectionState::Disconnected,
            transport: None,
            brick: Arc::new(Mutex::new(BrickState::new())),
            events: EventBus::default(),
            metrics,
            monitoring: Monitoring::new(config),
        })
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Prepared
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    pub fn metrics_text(&self) -> String {
        self.metrics.encode_text()
    }

    /// Attach a transport and prepare the brick: install the decode
    /// handler, chirp, request firmware and battery, scan all eight
    /// ports and start the polling loop.
    pub fn connect(&mut self, transport: SharedTransport) -> Result<()> {
        if self.state == ConnectionState::Prepared {
            return Ok(());
        }
        {
            let Ok(mut guard) = transport.lock() else {
                return Err(ProtocolError::Internal("transport lock poisoned"));
            };
            if !guard.is_connected() {
                return Err(ProtocolError::NotConnected);
            }
            let decoder = ResponseDecoder::new(self.events.clone(), self.metrics.clone());
            let brick = Arc::clone(&self.brick);
            guard.set_data_handler(Box::new(move |raw: &[u8]| {
                let Ok(mut state) = brick.lock() else {
                    return;
                };
                // Decode errors stay here, the transport never sees them.
                if let Err(err) = decoder.handle_frame(&mut state, raw) {
                    debug!(%err, "dropped response frame");
                }
            }));
        }
        self.state = ConnectionState::Connecting;
        self.transport = Some(transport);
        info!("preparing brick session");

        self.play_tone(2000, 200, 25);
        let (firmware, battery) = {
            let mut state = self.lock_brick()?;
            (state.commands.get_firmware()?, state.commands.get_battery()?)
        };
        self.send_read(firmware)?;
        self.send_read(battery)?;
        self.scan_devices()?;
        self.play_tone(3000, 200, 50);

        if let Some(transport) = &self.transport {
            self.monitoring.start(
                Arc::clone(&self.brick),
                Arc::clone(transport),
                self.metrics.clone(),
            );
        }
        self.state = ConnectionState::Prepared;
        Ok(())
    }

    /// Tear the session down. Safe at any time, including mid-scan:
    /// motors are stopped best-effort and every piece of session state
    /// is dropped.
    pub fn disconnect(&mut self) {
        self.monitoring.stop();
        self.stop_motors(false);
        self.clear();
        if let Ok(mut state) = self.brick.lock() {
            state.reset();
        }
        self.metrics.protocol.devices_attached.set(0);
        self.transport = None;
        self.state = ConnectionState::Disconnected;
        info!("brick session closed");
    }

    /// Ask every port what is plugged in. Answers arrive through the
    /// decode handler and land in the registry.
    pub fn scan_devices(&self) -> Result<()> {
        for port in InputPort::ALL {
            let frame = {
                let mut state = self.lock_brick()?;
                state.commands.get_device_type(port)?
            };
            self.send_read(frame)?;
        }
        Ok(())
    }

    /// One ad-hoc reading of a registered device, outside the polling
    /// cadence. Fails when the same read is already in flight.
    pub fn request_value(&self, name: DeviceName) -> Result<()> {
        let frame = {
            let mut state = self.lock_brick()?;
            let (port, kind, mode) = {
                let port = state
                    .registry
                    .port_of(name)
                    .ok_or(ProtocolError::Internal("device not registered"))?;
                let device = state
                    .registry
                    .device_on_port(port)
                    .ok_or(ProtocolError::Internal("device not registered"))?;
                (port, device.device_type.read_kind(), device.mode)
            };
            match kind {
                ReadKind::Raw => state.commands.get_sensor_data(port, mode)?,
                ReadKind::Pct => state.commands.get_sensor_data_pct(port, mode)?,
                ReadKind::Si => state.commands.get_sensor_data_si(port, mode)?,
                ReadKind::Actor => state.commands.get_actor_data(port, mode)?,
            }
        };
        self.send_read(frame)
    }

    pub fn firmware(&self) -> String {
        self.brick
            .lock()
            .map(|state| state.firmware.clone())
            .unwrap_or_default()
    }

    pub fn battery(&self) -> Vec<u8> {
        self.brick
            .lock()
            .map(|state| state.battery.clone())
            .unwrap_or_default()
    }

    /// Snapshot of the registry, for UIs and the CLI.
    pub fn devices(&self) -> Vec<(InputPort, Device)> {
        self.brick
            .lock()
            .map(|state| {
                state
                    .registry
                    .ports()
                    .map(|(port, device)| (port, device.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn device_value(&self, name: DeviceName) -> Option<DeviceValue> {
        self.brick.lock().ok()?.registry.value_of(name)
    }

    pub fn color_sensor_value(&self) -> Option<DeviceValue> {
        self.device_value(DeviceName::ColorSensor)
    }

    pub fn gyro_sensor_value(&self) -> Option<DeviceValue> {
        self.device_value(DeviceName::GyroSensor)
    }

    pub fn ir_sensor_value(&self) -> Option<DeviceValue> {
        self.device_value(DeviceName::IrSensor)
    }

    pub fn ultrasonic_sensor_value(&self) -> Option<DeviceValue> {
        self.device_value(DeviceName::UltrasonicSensor)
    }

    pub fn touch_sensor_value(&self) -> Option<DeviceValue> {
        self.device_value(DeviceName::TouchSensor)
    }

    pub fn large_motor_value(&self) -> Option<DeviceValue> {
        self.device_value(DeviceName::LargeMotor)
    }

    pub fn medium_motor_value(&self) -> Option<DeviceValue> {
        self.device_value(DeviceName::MediumMotor)
    }

    /// Seconds since any reading last changed. `None` before the first
    /// change.
    pub fn staleness(&self) -> Option<f64> {
        self.brick
            .lock()
            .ok()
            .and_then(|state| state.staleness(OffsetDateTime::now_utc()))
    }

    pub fn set_color_sensor_mode(&self, mode: ColorSensorMode) {
        self.set_device_mode(DeviceName::ColorSensor, mode as u8);
    }

    pub fn set_ir_sensor_mode(&self, mode: IrSensorMode) {
        self.set_device_mode(DeviceName::IrSensor, mode as u8);
    }

    pub fn set_ultrasonic_sensor_mode(&self, mode: UltrasonicSensorMode) {
        self.set_device_mode(DeviceName::UltrasonicSensor, mode as u8);
    }

    fn set_device_mode(&self, name: DeviceName, mode: u8) {
        if let Ok(mut state) = self.brick.lock() {
            if state.registry.set_mode(name, mode).is_none() {
                debug!(%name, "mode change for unregistered device");
            }
        }
    }

    pub fn set_led(&self, color: LedColor, mode: LedMode) {
        self.send_built(|state| state.commands.set_led(color, mode));
    }

    pub fn play_tone(&self, frequency: u16, duration: u16, volume: u8) {
        self.send_built(|state| state.commands.play_tone(frequency, duration, volume));
    }

    pub fn play_sound(&self, filename: &str, volume: u8) {
        self.send_built(|state| state.commands.play_sound(filename, volume));
    }

    pub fn draw_clean(&self) {
        self.send_built(|state| state.commands.draw_clean());
    }

    pub fn draw_update(&self) {
        self.send_built(|state| state.commands.draw_update());
    }

    pub fn draw_line(&self, x1: i32, y1: i32, x2: i32, y2: i32, color: u8) {
        self.send_built(|state| state.commands.draw_line(x1, y1, x2, y2, color));
    }

    pub fn draw_image(&self, filename: &str, x: i32, y: i32, color: u8) {
        self.send_built(|state| state.commands.draw_image(filename, x, y, color));
    }

    /// Drive all known motors at one power.
    pub fn move_power(&self, power: i8, brake: bool) {
        let ports = self.drive_mask();
        self.send_built(|state| state.commands.move_power(ports, power, brake));
    }

    pub fn move_power_left(&self, power: i8) {
        let ports = self.motor_mask(DeviceName::LargeMotor, DEFAULT_LEFT);
        self.send_built(|state| state.commands.move_power(ports, power, true));
    }

    pub fn move_power_right(&self, power: i8) {
        let ports = self.motor_mask(DeviceName::LargeMotorOpt, DEFAULT_RIGHT);
        self.send_built(|state| state.commands.move_power(ports, power, true));
    }

    /// Turn in place, the two motor groups running against each other.
    pub fn rotate_power(&self, power: i8, brake: bool) {
        let left = self.motor_mask(DeviceName::LargeMotor, DEFAULT_LEFT);
        let right = self.motor_mask(DeviceName::LargeMotorOpt, DEFAULT_RIGHT);
        self.send_built(|state| state.commands.rotate_power(left, right, power, power, brake));
    }

    pub fn move_steps(&self, steps: i32, speed: i8, brake: bool) {
        let ports = self.drive_mask();
        self.send_built(|state| state.commands.move_steps(ports, steps, speed, 0, 0, brake));
    }

    pub fn rotate_steps(&self, steps: i32, speed: i8, brake: bool) {
        let left = self.motor_mask(DeviceName::LargeMotor, DEFAULT_LEFT);
        let right = self.motor_mask(DeviceName::LargeMotorOpt, DEFAULT_RIGHT);
        self.send_built(|state| {
            state
                .commands
                .rotate_steps(left, right, steps, speed, speed, 0, 0, brake)
        });
    }

    pub fn stop_motors(&self, brake: bool) {
        self.send_built(|state| state.commands.stop(OutputPorts::ALL, brake));
    }

    /// Reset all on-brick input state.
    pub fn clear(&self) {
        self.send_built(|state| state.commands.clear());
    }

    fn drive_mask(&self) -> OutputPorts {
        let left = self.motor_mask(DeviceName::LargeMotor, DEFAULT_LEFT);
        let right = self.motor_mask(DeviceName::LargeMotorOpt, DEFAULT_RIGHT);
        left | right
    }

    fn motor_mask(&self, name: DeviceName, fallback: OutputPorts) -> OutputPorts {
        self.brick
            .lock()
            .ok()
            .and_then(|state| state.registry.output_mask_of(name))
            .unwrap_or(fallback)
    }

    fn lock_brick(&self) -> Result<std::sync::MutexGuard<'_, BrickState>> {
        self.brick
            .lock()
            .map_err(|_| ProtocolError::Internal("brick state lock poisoned"))
    }

    /// Build a frame under the state lock, then send it without the
    /// lock. The decode handler runs under the transport lock, so the
    /// two locks are never held together in this direction.
    fn send_built<F>(&self, build: F)
    where
        F: FnOnce(&mut BrickState) -> Result<Vec<u8>>,
    {
        let frame = match self.brick.lock() {
            Ok(mut state) => match build(&mut state) {
                Ok(frame) => frame,
                Err(err) => {
                    debug!(%err, "command build failed");
                    return;
                }
            },
            Err(_) => return,
        };
        self.send(&frame);
    }

    /// Claim the reply key, then send. Read-style frames carry their
    /// callback and target in bytes 2 and 3.
    fn send_read(&self, frame: Vec<u8>) -> Result<()> {
        if self.transport.is_none() {
            debug!("no transport attached, dropping read");
            return Ok(());
        }
        if frame.len() >= 4 {
            if let Some(callback) = CallbackType::from_u8(frame[2]) {
                if callback != CallbackType::None {
                    self.lock_brick()?.pending.begin(callback, frame[3])?;
                }
            }
        }
        self.send(&frame);
        Ok(())
    }

    fn send(&self, frame: &[u8]) {
        let Some(transport) = &self.transport else {
            debug!("no transport attached, dropping command");
            return;
        };
        let Ok(mut guard) = transport.lock() else {
            debug!("transport lock poisoned, dropping command");
            return;
        };
        match guard.send(frame) {
            Ok(()) => self.metrics.protocol.tx_buffers.inc(),
            Err(err) => debug!(%err, "send failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ev3_transport::MockTransport;

    fn mock() -> (Arc<Mutex<MockTransport>>, SharedTransport) {
        let concrete = Arc::new(Mutex::new(MockTransport::new()));
        let shared: SharedTransport = concrete.clone();
        (concrete, shared)
    }

    fn api() -> Ev3Api {
        Ev3Api::new(MonitoringConfig::default()).unwrap()
    }

    fn inject(transport: &Arc<Mutex<MockTransport>>, frame: &[u8]) {
        transport.lock().unwrap().inject(frame);
    }

    #[test]
    fn commands_without_transport_are_silent_no_ops() {
        let api = api();
        api.play_tone(440, 100, 50);
        api.move_power(80, false);
        api.stop_motors(true);
        assert_eq!(api.connection_state(), ConnectionState::Disconnected);
    }

    #[test]
    fn connect_refuses_a_dead_transport() {
        let mut api = api();
        let (concrete, shared) = mock();
        concrete.lock().unwrap().set_connected(false);
        assert_eq!(api.connect(shared), Err(ProtocolError::NotConnected));
        assert_eq!(api.connection_state(), ConnectionState::Disconnected);
    }

    #[test]
    fn connect_prepares_the_brick() {
        let mut api = api();
        let (concrete, shared) = mock();
        api.connect(shared).unwrap();
        assert_eq!(api.connection_state(), ConnectionState::Prepared);

        let guard = concrete.lock().unwrap();
        let frames = guard.sent();
        // Two tones, firmware, battery and the eight-port scan.
        assert_eq!(frames.len(), 12);
        assert_eq!(frames[1][2], CallbackType::Firmware as u8);
        assert_eq!(frames[2][2], CallbackType::Battery as u8);
        let scan_ports: Vec<u8> = frames[3..11].iter().map(|f| f[3]).collect();
        assert_eq!(
            scan_ports,
            vec![0x00, 0x01, 0x02, 0x03, 0x10, 0x11, 0x12, 0x13]
        );
    }

    #[test]
    fn responses_flow_through_the_installed_handler() {
        let mut api = api();
        let (concrete, shared) = mock();
        api.connect(shared).unwrap();

        inject(&concrete, &[0x07, 0x00, 0x20, 0x00, 0x02, b'V', b'1', b'.', b'0']);
        assert_eq!(api.firmware(), "V1.0");

        inject(&concrete, b"\x0f\x00\x01\x00\x02COL-REFLECT\x00");
        let devices = api.devices();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].1.name, DeviceName::ColorSensor);

        inject(&concrete, &[0x04, 0x00, 0x11, 0x00, 0x02, 0x2A]);
        assert_eq!(api.color_sensor_value(), Some(DeviceValue::Int(42)));
    }

    #[test]
    fn ad_hoc_reads_conflict_while_in_flight() {
        let mut api = api();
        let (concrete, shared) = mock();
        api.connect(shared).unwrap();
        inject(&concrete, b"\x0f\x00\x01\x00\x02COL-REFLECT\x00");

        api.request_value(DeviceName::ColorSensor).unwrap();
        let err = api.request_value(DeviceName::ColorSensor);
        assert_eq!(
            err,
            Err(ProtocolError::ConcurrentRequestConflict {
                callback: CallbackType::DeviceRawValue,
                port: 0x00,
            })
        );
        // The reply frees the slot.
        inject(&concrete, &[0x04, 0x00, 0x11, 0x00, 0x02, 0x2A]);
        api.request_value(DeviceName::ColorSensor).unwrap();
    }

    #[test]
    fn disconnect_resets_everything() {
        let mut api = api();
        let (concrete, shared) = mock();
        api.connect(shared).unwrap();
        inject(&concrete, b"\x0f\x00\x01\x00\x02COL-REFLECT\x00");
        inject(&concrete, &[0x07, 0x00, 0x20, 0x00, 0x02, b'V', b'1', b'.', b'0']);

        api.disconnect();
        assert_eq!(api.connection_state(), ConnectionState::Disconnected);
        assert!(api.devices().is_empty());
        assert!(api.firmware().is_empty());
        assert_eq!(api.color_sensor_value(), None);

        // Post-disconnect commands are no-ops, not panics.
        api.play_tone(440, 100, 10);
    }

    #[test]
    fn motor_masks_come_from_the_registry() {
        let mut api = api();
        let (concrete, shared) = mock();
        api.connect(shared).unwrap();
        inject(&concrete, b"\x0f\x00\x01\x10\x02L-MOTOR-DEG\x00");
        concrete.lock().unwrap().take_sent();

        api.move_power_left(60);
        let guard = concrete.lock().unwrap();
        let frames = guard.sent();
        // Port mask operand of OUTPUT.STOP is the registered motor's bit.
        assert_eq!(frames[0][11], OutputPorts::A.bits());
    }

    #[test]
    fn mode_changes_take_effect_in_the_registry() {
        let mut api = api();
        let (concrete, shared) = mock();
        api.connect(shared).unwrap();
        inject(&concrete, b"\x0f\x00\x01\x00\x02COL-REFLECT\x00");
        api.set_color_sensor_mode(ColorSensorMode::Color);
        let devices = api.devices();
        assert_eq!(devices[0].1.mode, ColorSensorMode::Color as u8);
    }
}
