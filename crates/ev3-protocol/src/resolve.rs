//! Classifies the raw device-type token a port scan returns.

use crate::types::DeviceType;

/// Outcome of classifying one scan answer.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    /// A known device type; mode, logical name and display hint derive
    /// from it.
    Device(DeviceType),
    /// Nothing plugged in.
    Empty,
    /// The port electronics are in a fault state, the brick needs a
    /// restart to recover.
    PortFault,
    /// Cable plugged in but the device is not answering, usually a wiring
    /// problem.
    Wiring,
    /// Token the table does not know, likely newer firmware.
    Unknown(String),
}

#[derive(Debug, Default)]
pub struct TypeResolver;

impl TypeResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(&self, raw: &str) -> Resolution {
        let trimmed = raw.trim();
        match trimmed {
            "" | "NONE" => Resolution::Empty,
            "PORT ERROR" => Resolution::PortFault,
            "TERMINAL" => Resolution::Wiring,
            _ => {
                let normalized = trimmed.replace(['-', ' '], "_");
                match DeviceType::from_normalized(&normalized) {
                    Some(ty) => Resolution::Device(ty),
                    None => Resolution::Unknown(trimmed.to_owned()),
                }
            }
        }
    }
}
