//! Inbound frame decoder and the mutable brick session state.
//!
//! An incoming frame is `[len_lo, len_hi, callback, port, reply_type,
//! payload...]`. The callback and port bytes are the two spare header
//! bytes of the request echoed back, which is the only way a reply is
//! matched to its request. All session state lives in [`BrickState`]
//! behind a single mutex, the decoder itself holds none.

use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use std::collections::HashSet;

use crate::commands::Commands;
use crate::error::{ProtocolError, Result};
use crate::events::{value_event, DeviceEvent, EventBus};
use crate::metrics::MetricsHub;
use crate::opcode::CallbackType;
use crate::ports::InputPort;
use crate::registry::DeviceRegistry;
use crate::resolve::{Resolution, TypeResolver};
use crate::types::{DeviceName, DeviceValue};

const MIN_FRAME_LEN: usize = 5;
const PAYLOAD_OFFSET: usize = 5;

/// Reads in flight, keyed the same way replies are matched.
///
/// There is no timeout. A reply that never arrives leaves its key
/// occupied until the monitoring loop re-polls the port, which replaces
/// the key and self-heals the slot.
#[derive(Debug, Default)]
pub struct PendingReads {
    inflight: HashSet<(CallbackType, u8)>,
}

impl PendingReads {
    /// Claim a key for an ad-hoc read. Fails when the same read is
    /// already in flight.
    pub fn begin(&mut self, callback: CallbackType, port: u8) -> Result<()> {
        if !self.inflight.insert((callback, port)) {
            return Err(ProtocolError::ConcurrentRequestConflict { callback, port });
        }
        Ok(())
    }

    /// Claim a key on behalf of the monitoring loop, replacing any stale
    /// claim.
    pub fn begin_poll(&mut self, callback: CallbackType, port: u8) {
        self.inflight.insert((callback, port));
    }

    pub fn complete(&mut self, callback: CallbackType, port: u8) -> bool {
        self.inflight.remove(&(callback, port))
    }

    pub fn len(&self) -> usize {
        self.inflight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inflight.is_empty()
    }

    pub fn clear(&mut self) {
        self.inflight.clear();
    }
}

/// Everything mutable about one brick session. Single-writer by
/// construction, the owner wraps it in one `Mutex`.
#[derive(Debug, Default)]
pub struct BrickState {
    pub registry: DeviceRegistry,
    pub commands: Commands,
    pub firmware: String,
    pub battery: Vec<u8>,
    pub pending: PendingReads,
    pub last_change: Option<OffsetDateTime>,
}

impl BrickState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds since a device reading last changed.
    pub fn staleness(&self, now: OffsetDateTime) -> Option<f64> {
        self.last_change
            .map(|at| (now - at).as_seconds_f64().max(0.0))
    }

    /// Back to the state of a fresh connection.
    pub fn reset(&mut self) {
        self.registry.reset();
        self.commands.clear_cache();
        self.firmware.clear();
        self.battery.clear();
        self.pending.clear();
        self.last_change = None;
    }
}

/// What one frame did to the session state.
#[derive(Clone, Debug, PartialEq)]
pub enum Decoded {
    Attached { port: InputPort, name: DeviceName },
    ValueChanged { name: DeviceName, value: DeviceValue, port: InputPort },
    Firmware(String),
    Battery(Vec<u8>),
    /// A valid reading identical to the previous one.
    NoChange,
    /// Frame did not apply to anything we track.
    Ignored,
}

pub struct ResponseDecoder {
    resolver: TypeResolver,
    events: EventBus,
    metrics: MetricsHub,
}

impl ResponseDecoder {
    pub fn new(events: EventBus, metrics: MetricsHub) -> Self {
        Self {
            resolver: TypeResolver::new(),
            events,
            metrics,
        }
    }

    /// Decode one frame and apply it to the session state. Errors are
    /// meant for logs and counters, the transport never sees them.
    pub fn handle_frame(&self, state: &mut BrickState, raw: &[u8]) -> Result<Decoded> {
        self.metrics.protocol.rx_frames.inc();
        if raw.len() < MIN_FRAME_LEN {
            self.metrics.protocol.decode_errors.inc();
            warn!(len = raw.len(), "dropping truncated response frame");
            return Err(ProtocolError::TruncatedFrame { len: raw.len() });
        }
        let port_byte = raw[3];
        let payload = &raw[PAYLOAD_OFFSET..];
        let callback = match CallbackType::from_u8(raw[2]) {
            Some(callback) => callback,
            None => {
                debug!(callback = raw[2], "ignoring unknown callback tag");
                return Ok(Decoded::Ignored);
            }
        };
        state.pending.complete(callback, port_byte);

        match callback {
            CallbackType::None => Ok(Decoded::Ignored),
            CallbackType::Firmware => {
                let firmware = ascii_text(payload);
                info!(version = %firmware, "brick firmware");
                state.firmware = firmware.clone();
                self.events.emit(DeviceEvent::Firmware(firmware.clone()));
                Ok(Decoded::Firmware(firmware))
            }
            CallbackType::Battery => {
                state.battery = payload.to_vec();
                self.events.emit(DeviceEvent::Battery(state.battery.clone()));
                Ok(Decoded::Battery(state.battery.clone()))
            }
            CallbackType::DeviceName => self.handle_device_name(state, port_byte, payload),
            CallbackType::DevicePctValue | CallbackType::DeviceRawValue => {
                let value = payload
                    .first()
                    .map(|b| DeviceValue::Int(i32::from(*b)))
                    .ok_or(ProtocolError::TruncatedFrame { len: raw.len() })?;
                self.apply_value(state, port_byte, value)
            }
            CallbackType::DeviceSiValue => {
                let bytes = si_bytes(payload, raw.len())?;
                // One decimal, keeps jittery analog readings from
                // flooding the event bus.
                let value = (f32::from_le_bytes(bytes) * 10.0).round() / 10.0;
                self.apply_value(state, port_byte, DeviceValue::Float(value))
            }
            CallbackType::ActorValue => {
                let bytes = si_bytes(payload, raw.len())?;
                let value = DeviceValue::Int(i32::from_le_bytes(bytes));
                self.apply_value(state, port_byte, value)
            }
        }
    }

    fn handle_device_name(
        &self,
        state: &mut BrickState,
        port_byte: u8,
        payload: &[u8],
    ) -> Result<Decoded> {
        let port = match InputPort::from_u8(port_byte) {
            Some(port) => port,
            None => {
                debug!(port = port_byte, "device name for unknown port");
                return Ok(Decoded::Ignored);
            }
        };
        let token = ascii_text(payload);
        match self.resolver.resolve(&token) {
            Resolution::Device(ty) => {
                let name = state.registry.attach(port, ty).inspect_err(|_| {
                    self.metrics.protocol.decode_errors.inc();
                })?;
                self.metrics
                    .protocol
                    .devices_attached
                    .set(state.registry.len() as i64);
                self.events.emit(DeviceEvent::Attached { port, name });
                Ok(Decoded::Attached { port, name })
            }
            Resolution::Empty => Ok(Decoded::Ignored),
            Resolution::PortFault => {
                error!(%port, "port hardware fault, restart the brick");
                self.metrics.protocol.decode_errors.inc();
                self.events.emit(DeviceEvent::SensorFault { port });
                Err(ProtocolError::PortFault(port))
            }
            Resolution::Wiring => {
                warn!(%port, "device not answering, check the wiring");
                Err(ProtocolError::WiringFault(port))
            }
            Resolution::Unknown(raw) => {
                warn!(%port, token = %raw, "unknown device type");
                self.metrics.protocol.decode_errors.inc();
                Err(ProtocolError::UnknownDeviceType(raw))
            }
        }
    }

    fn apply_value(
        &self,
        state: &mut BrickState,
        port_byte: u8,
        value: DeviceValue,
    ) -> Result<Decoded> {
        let Some(port) = InputPort::from_u8(port_byte) else {
            return Ok(Decoded::Ignored);
        };
        // Readings for ports nothing is registered on are dropped, the
        // scan has not answered for that port yet.
        let Some(update) = state.registry.update_value(port, value) else {
            return Ok(Decoded::Ignored);
        };
        if !update.changed {
            return Ok(Decoded::NoChange);
        }
        state.last_change = Some(OffsetDateTime::now_utc());
        self.events.emit(value_event(update.name, update.value, port));
        Ok(Decoded::ValueChanged {
            name: update.name,
            value: update.value,
            port,
        })
    }
}

fn ascii_text(payload: &[u8]) -> String {
    let end = payload
        .iter()
        .position(|&b| b == 0x00)
        .unwrap_or(payload.len());
    String::from_utf8_lossy(&payload[..end]).trim().to_owned()
}

fn si_bytes(payload: &[u8], frame_len: usize) -> Result<[u8; 4]> {
    payload
        .get(..4)
        .and_then(|bytes| <[u8; 4]>::try_from(bytes).ok())
        .ok_or(ProtocolError::TruncatedFrame { len: frame_len })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeviceType;

    fn decoder() -> ResponseDecoder {
        ResponseDecoder::new(EventBus::default(), MetricsHub::new().unwrap())
    }

    fn frame(callback: u8, port: u8, payload: &[u8]) -> Vec<u8> {
        let len = payload.len() + 3;
        let mut frame = vec![(len & 0xFF) as u8, (len >> 8) as u8, callback, port, 0x02];
        frame.extend_from_slice(payload);
        frame
    }

    #[test]
    fn truncated_frames_are_rejected() {
        let decoder = decoder();
        let mut state = BrickState::new();
        let err = decoder.handle_frame(&mut state, &[0x02, 0x00, 0x20]);
        assert_eq!(err, Err(ProtocolError::TruncatedFrame { len: 3 }));
    }

    #[test]
    fn unknown_callbacks_are_ignored() {
        let decoder = decoder();
        let mut state = BrickState::new();
        let decoded = decoder
            .handle_frame(&mut state, &frame(0x7F, 0x00, &[0x01]))
            .unwrap();
        assert_eq!(decoded, Decoded::Ignored);
    }

    #[test]
    fn firmware_text_is_trimmed_at_the_nul() {
        let decoder = decoder();
        let mut state = BrickState::new();
        let mut payload = *b"V1.09H\0\0\0\0\0\0\0\0\0\0";
        payload[8] = 0xAA; // junk after the terminator
        let decoded = decoder
            .handle_frame(&mut state, &frame(0x20, 0x00, &payload))
            .unwrap();
        assert_eq!(decoded, Decoded::Firmware("V1.09H".into()));
        assert_eq!(state.firmware, "V1.09H");
    }

    #[test]
    fn scan_answer_attaches_and_first_reading_raises_an_event() {
        let bus = EventBus::default();
        let decoder = ResponseDecoder::new(bus.clone(), MetricsHub::new().unwrap());
        let mut receiver = bus.subscribe();
        let mut state = BrickState::new();

        let decoded = decoder
            .handle_frame(&mut state, &frame(0x01, 0x00, b"COL-REFLECT\0"))
            .unwrap();
        assert_eq!(
            decoded,
            Decoded::Attached {
                port: InputPort::One,
                name: DeviceName::ColorSensor,
            }
        );
        assert_eq!(
            receiver.try_recv(),
            Ok(DeviceEvent::Attached {
                port: InputPort::One,
                name: DeviceName::ColorSensor,
            })
        );

        // 0x2A on the raw callback is a reading of 42.
        let decoded = decoder
            .handle_frame(&mut state, &frame(0x11, 0x00, &[0x2A]))
            .unwrap();
        assert_eq!(
            decoded,
            Decoded::ValueChanged {
                name: DeviceName::ColorSensor,
                value: DeviceValue::Int(42),
                port: InputPort::One,
            }
        );
        assert_eq!(
            state.registry.value_of(DeviceName::ColorSensor),
            Some(DeviceValue::Int(42))
        );

        // Same reading again: state updated silently, no event.
        let decoded = decoder
            .handle_frame(&mut state, &frame(0x11, 0x00, &[0x2A]))
            .unwrap();
        assert_eq!(decoded, Decoded::NoChange);
        assert!(matches!(
            receiver.try_recv(),
            Ok(DeviceEvent::ColorSensorValue { .. })
        ));
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn si_values_decode_as_rounded_floats() {
        let decoder = decoder();
        let mut state = BrickState::new();
        state
            .registry
            .attach(InputPort::Three, DeviceType::GyroAng)
            .unwrap();
        let payload = 1.04f32.to_le_bytes();
        let decoded = decoder
            .handle_frame(&mut state, &frame(0x12, 0x02, &payload))
            .unwrap();
        assert_eq!(
            decoded,
            Decoded::ValueChanged {
                name: DeviceName::GyroSensor,
                value: DeviceValue::Float(1.0),
                port: InputPort::Three,
            }
        );
    }

    #[test]
    fn actor_values_decode_as_le_i32() {
        let decoder = decoder();
        let mut state = BrickState::new();
        state
            .registry
            .attach(InputPort::B, DeviceType::LMotorDeg)
            .unwrap();
        let payload = (-720i32).to_le_bytes();
        let decoded = decoder
            .handle_frame(&mut state, &frame(0x05, 0x11, &payload))
            .unwrap();
        assert_eq!(
            decoded,
            Decoded::ValueChanged {
                name: DeviceName::LargeMotor,
                value: DeviceValue::Int(-720),
                port: InputPort::B,
            }
        );
    }

    #[test]
    fn readings_for_unscanned_ports_are_dropped() {
        let decoder = decoder();
        let mut state = BrickState::new();
        let decoded = decoder
            .handle_frame(&mut state, &frame(0x11, 0x01, &[0x10]))
            .unwrap();
        assert_eq!(decoded, Decoded::Ignored);
    }

    #[test]
    fn port_error_raises_a_fault_event() {
        let bus = EventBus::default();
        let decoder = ResponseDecoder::new(bus.clone(), MetricsHub::new().unwrap());
        let mut receiver = bus.subscribe();
        let mut state = BrickState::new();
        let err = decoder.handle_frame(&mut state, &frame(0x01, 0x01, b"PORT ERROR\0"));
        assert_eq!(err, Err(ProtocolError::PortFault(InputPort::Two)));
        assert_eq!(
            receiver.try_recv(),
            Ok(DeviceEvent::SensorFault { port: InputPort::Two })
        );
        assert!(state.registry.is_empty());
    }

    #[test]
    fn empty_ports_stay_silent() {
        let decoder = decoder();
        let mut state = BrickState::new();
        let decoded = decoder
            .handle_frame(&mut state, &frame(0x01, 0x03, b"NONE\0"))
            .unwrap();
        assert_eq!(decoded, Decoded::Ignored);
        assert!(state.registry.is_empty());
    }

    #[test]
    fn replies_release_their_pending_key() {
        let decoder = decoder();
        let mut state = BrickState::new();
        state
            .pending
            .begin(CallbackType::Firmware, 0x00)
            .unwrap();
        assert_eq!(
            state.pending.begin(CallbackType::Firmware, 0x00),
            Err(ProtocolError::ConcurrentRequestConflict {
                callback: CallbackType::Firmware,
                port: 0x00,
            })
        );
        decoder
            .handle_frame(&mut state, &frame(0x20, 0x00, b"V1.09H\0"))
            .unwrap();
        assert!(state.pending.is_empty());
        assert!(state.pending.begin(CallbackType::Firmware, 0x00).is_ok());
    }

    #[test]
    fn poll_claims_replace_stale_keys() {
        let mut pending = PendingReads::default();
        pending.begin(CallbackType::DeviceRawValue, 0x00).unwrap();
        // A lost reply leaves the key behind; the next poll takes it over.
        pending.begin_poll(CallbackType::DeviceRawValue, 0x00);
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn reset_returns_to_a_fresh_session() {
        let decoder = decoder();
        let mut state = BrickState::new();
        decoder
            .handle_frame(&mut state, &frame(0x01, 0x00, b"TOUCH\0"))
            .unwrap();
        decoder
            .handle_frame(&mut state, &frame(0x20, 0x00, b"V1.09H\0"))
            .unwrap();
        state.pending.begin_poll(CallbackType::Battery, 0x00);
        state.reset();
        assert!(state.registry.is_empty());
        assert!(state.pending.is_empty());
        assert!(state.firmware.is_empty());
        assert_eq!(state.last_change, None);
    }
}
