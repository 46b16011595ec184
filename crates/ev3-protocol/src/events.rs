//! Change events, keyed by logical device name.
//!
//! Subscribers get an event only when a reading actually changes, the
//! polling cadence itself is invisible to them.

use tokio::sync::broadcast;

use crate::ports::InputPort;
use crate::types::{DeviceName, DeviceValue};

#[derive(Clone, Debug, PartialEq)]
pub enum DeviceEvent {
    /// A scanned port answered with a known device.
    Attached { port: InputPort, name: DeviceName },
    /// A scanned port reported a hardware fault.
    SensorFault { port: InputPort },
    Firmware(String),
    Battery(Vec<u8>),
    ColorSensorValue { value: DeviceValue, port: InputPort },
    GyroSensorValue { value: DeviceValue, port: InputPort },
    IrSensorValue { value: DeviceValue, port: InputPort },
    UltrasonicSensorValue { value: DeviceValue, port: InputPort },
    TouchSensorValue { value: DeviceValue, port: InputPort },
    TouchSensorOptValue { value: DeviceValue, port: InputPort },
    LargeMotorValue { value: DeviceValue, port: InputPort },
    LargeMotorOptValue { value: DeviceValue, port: InputPort },
    MediumMotorValue { value: DeviceValue, port: InputPort },
    MediumMotorOptValue { value: DeviceValue, port: InputPort },
}

/// Maps a changed reading to its name-keyed event variant.
pub fn value_event(name: DeviceName, value: DeviceValue, port: InputPort) -> DeviceEvent {
    match name {
        DeviceName::ColorSensor => DeviceEvent::ColorSensorValue { value, port },
        DeviceName::GyroSensor => DeviceEvent::GyroSensorValue { value, port },
        DeviceName::IrSensor => DeviceEvent::IrSensorValue { value, port },
        DeviceName::UltrasonicSensor => DeviceEvent::UltrasonicSensorValue { value, port },
        DeviceName::TouchSensor => DeviceEvent::TouchSensorValue { value, port },
        DeviceName::TouchSensorOpt => DeviceEvent::TouchSensorOptValue { value, port },
        DeviceName::LargeMotor => DeviceEvent::LargeMotorValue { value, port },
        DeviceName::LargeMotorOpt => DeviceEvent::LargeMotorOptValue { value, port },
        DeviceName::MediumMotor => DeviceEvent::MediumMotorValue { value, port },
        DeviceName::MediumMotorOpt => DeviceEvent::MediumMotorOptValue { value, port },
    }
}

/// Broadcast fan-out. Emitting with no subscribers is fine, slow
/// subscribers observe a lag error and keep going.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<DeviceEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: DeviceEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_events_follow_the_name() {
        let event = value_event(
            DeviceName::LargeMotor,
            DeviceValue::Int(360),
            InputPort::B,
        );
        assert_eq!(
            event,
            DeviceEvent::LargeMotorValue {
                value: DeviceValue::Int(360),
                port: InputPort::B,
            }
        );
        let event = value_event(
            DeviceName::TouchSensorOpt,
            DeviceValue::Int(1),
            InputPort::Two,
        );
        assert!(matches!(event, DeviceEvent::TouchSensorOptValue { .. }));
    }

    #[test]
    fn subscribers_see_emitted_events() {
        let bus = EventBus::default();
        let mut receiver = bus.subscribe();
        bus.emit(DeviceEvent::Firmware("V1.09H".into()));
        assert_eq!(
            receiver.try_recv(),
            Ok(DeviceEvent::Firmware("V1.09H".into()))
        );
    }

    #[test]
    fn emitting_without_subscribers_is_a_no_op() {
        let bus = EventBus::default();
        bus.emit(DeviceEvent::SensorFault { port: InputPort::One });
    }
}
