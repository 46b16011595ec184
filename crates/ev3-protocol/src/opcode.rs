//! Byte-code tables for the EV3 direct-command protocol.

/// Tag identifying the shape of a response payload. The brick echoes the
/// two spare header bytes of a request back in its reply, which is the only
/// correlation mechanism the protocol has: responses match requests by
/// `(callback, port)` alone, there is no sequence number.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum CallbackType {
    None = 0x00,
    DeviceName = 0x01,
    ActorValue = 0x05,
    DevicePctValue = 0x10,
    DeviceRawValue = 0x11,
    DeviceSiValue = 0x12,
    Firmware = 0x20,
    Battery = 0x21,
}

impl CallbackType {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0x00 => Some(Self::None),
            0x01 => Some(Self::DeviceName),
            0x05 => Some(Self::ActorValue),
            0x10 => Some(Self::DevicePctValue),
            0x11 => Some(Self::DeviceRawValue),
            0x12 => Some(Self::DeviceSiValue),
            0x20 => Some(Self::Firmware),
            0x21 => Some(Self::Battery),
            _ => None,
        }
    }
}

/// Every byte-code the command builders emit. Closed on purpose: adding an
/// opcode means extending the match in [`Opcode::bytes`] and deciding what
/// the decoder expects back.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Opcode {
    UiReadBattery,
    UiReadFirmware,
    UiWriteLed,
    UiDrawUpdate,
    UiDrawClean,
    UiDrawLine,
    UiDrawBmpFile,
    SoundTone,
    SoundPlay,
    InputDeviceGetDeviceName,
    InputDeviceReadPct,
    InputDeviceReadRaw,
    InputDeviceReadSi,
    InputDeviceClearAll,
    OutputStop,
    OutputPower,
    OutputStart,
    OutputStepSpeed,
}

impl Opcode {
    pub fn bytes(self) -> &'static [u8] {
        match self {
            Self::UiReadBattery => &[0x81, 0x12],
            Self::UiReadFirmware => &[0x81, 0x0A],
            Self::UiWriteLed => &[0x82, 0x1B],
            Self::UiDrawUpdate => &[0x84, 0x00],
            Self::UiDrawClean => &[0x84, 0x01],
            Self::UiDrawLine => &[0x84, 0x03],
            Self::UiDrawBmpFile => &[0x84, 0x1C],
            Self::SoundTone => &[0x94, 0x01],
            Self::SoundPlay => &[0x94, 0x02],
            Self::InputDeviceGetDeviceName => &[0x99, 0x15],
            Self::InputDeviceReadPct => &[0x99, 0x1B],
            Self::InputDeviceReadRaw => &[0x99, 0x1C],
            Self::InputDeviceReadSi => &[0x99, 0x1D],
            Self::InputDeviceClearAll => &[0x99, 0x0A],
            Self::OutputStop => &[0xA3],
            Self::OutputPower => &[0xA4],
            Self::OutputStart => &[0xA6],
            Self::OutputStepSpeed => &[0xAE],
        }
    }
}

/// Brick status LED colors.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum LedColor {
    Off = 0,
    Green = 1,
    Red = 2,
    Orange = 3,
}

/// Brick status LED modes. The wire value is `color + mode`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum LedMode {
    Normal = 0,
    Flash = 3,
    Pulse = 6,
}

// Direct-command type byte: replies expected only when a callback is set.
pub(crate) const DIRECT_REPLY: u8 = 0x00;
pub(crate) const DIRECT_NOREPLY: u8 = 0x80;

// Parameter-size prefixes for encoded operands.
pub(crate) const PARAM_BYTE: u8 = 0x81;
pub(crate) const PARAM_SHORT: u8 = 0x82;
pub(crate) const PARAM_INT: u8 = 0x83;
pub(crate) const PARAM_STRING: u8 = 0x84;
pub(crate) const PARAM_INDEX: u8 = 0xE1;
