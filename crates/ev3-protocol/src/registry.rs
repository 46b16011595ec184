//! Registry of devices discovered on the brick's ports.
//!
//! Two maps, port to device and logical name to port. Lookups from user
//! code go by logical name, the decoder walks in by port.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, error};

use crate::error::{ProtocolError, Result};
use crate::ports::{InputPort, OutputPorts};
use crate::types::{Device, DeviceName, DeviceType, DeviceValue};

/// Result of feeding one decoded reading into the registry.
#[derive(Clone, Debug, PartialEq)]
pub struct ValueUpdate {
    pub name: DeviceName,
    pub value: DeviceValue,
    pub changed: bool,
}

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    by_port: BTreeMap<InputPort, Device>,
    by_name: HashMap<DeviceName, InputPort>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scanned device. A second motor or touch sensor of the
    /// same kind lands on its `_OPT` alias; any other duplicate is a
    /// collision and the port keeps its previous binding.
    pub fn attach(&mut self, port: InputPort, device_type: DeviceType) -> Result<DeviceName> {
        let mut name = device_type.device_name();
        if let Some(&bound) = self.by_name.get(&name) {
            if bound != port {
                match name.opt_alias() {
                    Some(alias) if self.by_name.get(&alias).map_or(true, |&p| p == port) => {
                        name = alias;
                    }
                    _ => {
                        error!(%name, %port, "device already registered on port {bound}");
                        return Err(ProtocolError::DuplicateDeviceCollision { name, port });
                    }
                }
            }
        }
        // A swapped device frees the port's previous name binding.
        if let Some(previous) = self.by_port.get(&port) {
            if previous.name != name {
                self.by_name.remove(&previous.name);
            }
        }
        let device = Device::new(
            name,
            device_type,
            device_type.default_mode(),
            device_type.css_hint(),
        );
        debug!(%name, %port, raw = device_type.raw_token(), "device attached");
        self.by_port.insert(port, device);
        self.by_name.insert(name, port);
        Ok(name)
    }

    pub fn device(&self, name: DeviceName) -> Option<&Device> {
        self.by_name.get(&name).and_then(|port| self.by_port.get(port))
    }

    pub fn device_on_port(&self, port: InputPort) -> Option<&Device> {
        self.by_port.get(&port)
    }

    pub fn port_of(&self, name: DeviceName) -> Option<InputPort> {
        self.by_name.get(&name).copied()
    }

    pub fn value_of(&self, name: DeviceName) -> Option<DeviceValue> {
        self.device(name).map(|device| device.value)
    }

    /// Switch the mode a device is polled in. Returns the port so the
    /// caller can drop the stale reading.
    pub fn set_mode(&mut self, name: DeviceName, mode: u8) -> Option<InputPort> {
        let port = self.port_of(name)?;
        let device = self.by_port.get_mut(&port)?;
        device.mode = mode;
        Some(port)
    }

    /// Output-port bit of a registered motor.
    pub fn output_mask_of(&self, name: DeviceName) -> Option<OutputPorts> {
        self.port_of(name).and_then(InputPort::output_mask)
    }

    /// Store a decoded reading, reporting whether it differs from the
    /// previous one.
    pub fn update_value(&mut self, port: InputPort, value: DeviceValue) -> Option<ValueUpdate> {
        let device = self.by_port.get_mut(&port)?;
        let changed = device.value != value;
        device.value = value;
        Some(ValueUpdate {
            name: device.name,
            value,
            changed,
        })
    }

    pub fn ports(&self) -> impl Iterator<Item = (InputPort, &Device)> {
        self.by_port.iter().map(|(port, device)| (*port, device))
    }

    pub fn len(&self) -> usize {
        self.by_port.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_port.is_empty()
    }

    pub fn reset(&mut self) {
        self.by_port.clear();
        self.by_name.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_uses_type_defaults() {
        let mut registry = DeviceRegistry::new();
        let name = registry.attach(InputPort::One, DeviceType::ColColor).unwrap();
        assert_eq!(name, DeviceName::ColorSensor);
        let device = registry.device(DeviceName::ColorSensor).unwrap();
        assert_eq!(device.mode, 2);
        assert_eq!(device.css_hint, "color");
        assert_eq!(device.value, DeviceValue::Int(0));
        assert_eq!(registry.port_of(DeviceName::ColorSensor), Some(InputPort::One));
    }

    #[test]
    fn second_touch_sensor_lands_on_the_alias() {
        let mut registry = DeviceRegistry::new();
        assert_eq!(
            registry.attach(InputPort::One, DeviceType::Touch).unwrap(),
            DeviceName::TouchSensor
        );
        assert_eq!(
            registry.attach(InputPort::Two, DeviceType::Touch).unwrap(),
            DeviceName::TouchSensorOpt
        );
        assert_eq!(registry.port_of(DeviceName::TouchSensorOpt), Some(InputPort::Two));
    }

    #[test]
    fn third_duplicate_is_a_collision() {
        let mut registry = DeviceRegistry::new();
        registry.attach(InputPort::A, DeviceType::LMotorDeg).unwrap();
        registry.attach(InputPort::B, DeviceType::LMotorDeg).unwrap();
        let err = registry.attach(InputPort::C, DeviceType::LMotorDeg);
        assert_eq!(
            err,
            Err(ProtocolError::DuplicateDeviceCollision {
                name: DeviceName::LargeMotorOpt,
                port: InputPort::C,
            })
        );
    }

    #[test]
    fn duplicate_color_sensor_is_a_collision() {
        let mut registry = DeviceRegistry::new();
        registry.attach(InputPort::One, DeviceType::ColReflect).unwrap();
        let err = registry.attach(InputPort::Two, DeviceType::ColAmbient);
        assert_eq!(
            err,
            Err(ProtocolError::DuplicateDeviceCollision {
                name: DeviceName::ColorSensor,
                port: InputPort::Two,
            })
        );
    }

    #[test]
    fn rescan_of_the_same_port_replaces_the_device() {
        let mut registry = DeviceRegistry::new();
        registry.attach(InputPort::One, DeviceType::Touch).unwrap();
        registry.attach(InputPort::One, DeviceType::GyroAng).unwrap();
        assert_eq!(registry.device(DeviceName::TouchSensor), None);
        assert_eq!(registry.port_of(DeviceName::GyroSensor), Some(InputPort::One));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn value_updates_report_deltas_only() {
        let mut registry = DeviceRegistry::new();
        registry.attach(InputPort::Three, DeviceType::GyroAng).unwrap();
        let update = registry
            .update_value(InputPort::Three, DeviceValue::Float(90.0))
            .unwrap();
        assert!(update.changed);
        let update = registry
            .update_value(InputPort::Three, DeviceValue::Float(90.0))
            .unwrap();
        assert!(!update.changed);
        assert_eq!(registry.update_value(InputPort::Four, DeviceValue::Int(1)), None);
    }

    #[test]
    fn motor_masks_derive_from_the_port() {
        let mut registry = DeviceRegistry::new();
        registry.attach(InputPort::B, DeviceType::LMotorDeg).unwrap();
        assert_eq!(
            registry.output_mask_of(DeviceName::LargeMotor),
            Some(OutputPorts::B)
        );
        assert_eq!(registry.output_mask_of(DeviceName::MediumMotor), None);
    }

    #[test]
    fn reset_empties_everything() {
        let mut registry = DeviceRegistry::new();
        registry.attach(InputPort::One, DeviceType::Touch).unwrap();
        registry.reset();
        assert!(registry.is_empty());
        assert_eq!(registry.port_of(DeviceName::TouchSensor), None);
    }
}
