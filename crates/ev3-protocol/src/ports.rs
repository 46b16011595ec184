use bitflags::bitflags;
use core::fmt;

/// Scan address of a physical connector. Sensor ports 1-4 live at
/// 0x00-0x03, motor ports A-D are read back through 0x10-0x13.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum InputPort {
    One = 0x00,
    Two = 0x01,
    Three = 0x02,
    Four = 0x03,
    A = 0x10,
    B = 0x11,
    C = 0x12,
    D = 0x13,
}

impl InputPort {
    pub const SENSOR_PORTS: [InputPort; 4] = [Self::One, Self::Two, Self::Three, Self::Four];
    pub const MOTOR_PORTS: [InputPort; 4] = [Self::A, Self::B, Self::C, Self::D];
    pub const ALL: [InputPort; 8] = [
        Self::One,
        Self::Two,
        Self::Three,
        Self::Four,
        Self::A,
        Self::B,
        Self::C,
        Self::D,
    ];

    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0x00 => Some(Self::One),
            0x01 => Some(Self::Two),
            0x02 => Some(Self::Three),
            0x03 => Some(Self::Four),
            0x10 => Some(Self::A),
            0x11 => Some(Self::B),
            0x12 => Some(Self::C),
            0x13 => Some(Self::D),
            _ => None,
        }
    }

    pub fn is_motor(self) -> bool {
        (self as u8) >= 0x10
    }

    /// Output-port bit for motor ports (A=0x01 .. D=0x08), `None` for
    /// sensor ports.
    pub fn output_mask(self) -> Option<OutputPorts> {
        if self.is_motor() {
            OutputPorts::from_bits(1 << ((self as u8) - 0x10))
        } else {
            None
        }
    }
}

impl fmt::Display for InputPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::One => "1",
            Self::Two => "2",
            Self::Three => "3",
            Self::Four => "4",
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
        };
        f.write_str(label)
    }
}

bitflags! {
    /// Output ports as bit flags so one command can address several motors.
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
    pub struct OutputPorts: u8 {
        const A = 0x01;
        const B = 0x02;
        const C = 0x04;
        const D = 0x08;
        const ALL = 0x0F;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_addresses_round_trip() {
        for port in InputPort::ALL {
            assert_eq!(InputPort::from_u8(port as u8), Some(port));
        }
        assert_eq!(InputPort::from_u8(0x04), None);
        assert_eq!(InputPort::from_u8(0xFF), None);
    }

    #[test]
    fn motor_ports_map_to_output_bits() {
        assert_eq!(InputPort::A.output_mask(), Some(OutputPorts::A));
        assert_eq!(InputPort::D.output_mask(), Some(OutputPorts::D));
        assert_eq!(InputPort::One.output_mask(), None);
        assert_eq!(
            OutputPorts::B | OutputPorts::C,
            OutputPorts::from_bits_truncate(0x06)
        );
    }
}
