//! Device tables: raw brick-reported type tokens, logical device names and
//! their default read modes.

use core::fmt;

/// Color sensor modes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum ColorSensorMode {
    Reflective = 0,
    Ambient = 1,
    Color = 2,
}

/// Gyro sensor modes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum GyroMode {
    Angle = 0,
    Rate = 1,
}

/// Infrared sensor modes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum IrSensorMode {
    Proximity = 0,
    Seek = 1,
    RemoteControl = 2,
}

/// Ultrasonic sensor modes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum UltrasonicSensorMode {
    DistCm = 0,
    DistInch = 1,
    Listen = 2,
}

/// Motor tacho modes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum MotorMode {
    Degree = 0,
    Rotation = 1,
}

/// Which read command the monitoring loop uses for a device.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReadKind {
    Raw,
    Pct,
    Si,
    Actor,
}

/// Raw device-type tokens as the brick reports them on a device-name scan.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum DeviceType {
    ColAmbient,
    ColColor,
    ColReflect,
    GyroAng,
    GyroRate,
    IrProx,
    IrRemote,
    IrSeek,
    LMotorDeg,
    LMotorRot,
    MMotorDeg,
    MMotorRot,
    Touch,
    UsDistCm,
    UsDistIn,
    UsListen,
}

impl DeviceType {
    /// Look up a raw token with `-` and spaces normalized to `_`.
    pub fn from_normalized(token: &str) -> Option<Self> {
        match token {
            "COL_AMBIENT" => Some(Self::ColAmbient),
            "COL_COLOR" => Some(Self::ColColor),
            "COL_REFLECT" => Some(Self::ColReflect),
            "GYRO_ANG" => Some(Self::GyroAng),
            "GYRO_RATE" => Some(Self::GyroRate),
            "IR_PROX" => Some(Self::IrProx),
            "IR_REMOTE" => Some(Self::IrRemote),
            "IR_SEEK" => Some(Self::IrSeek),
            "L_MOTOR_DEG" => Some(Self::LMotorDeg),
            "L_MOTOR_ROT" => Some(Self::LMotorRot),
            "M_MOTOR_DEG" => Some(Self::MMotorDeg),
            "M_MOTOR_ROT" => Some(Self::MMotorRot),
            "TOUCH" => Some(Self::Touch),
            "US_DIST_CM" => Some(Self::UsDistCm),
            "US_DIST_IN" => Some(Self::UsDistIn),
            "US_LISTEN" => Some(Self::UsListen),
            _ => None,
        }
    }

    pub fn raw_token(self) -> &'static str {
        match self {
            Self::ColAmbient => "COL-AMBIENT",
            Self::ColColor => "COL-COLOR",
            Self::ColReflect => "COL-REFLECT",
            Self::GyroAng => "GYRO-ANG",
            Self::GyroRate => "GYRO-RATE",
            Self::IrProx => "IR-PROX",
            Self::IrRemote => "IR-REMOTE",
            Self::IrSeek => "IR-SEEK",
            Self::LMotorDeg => "L-MOTOR-DEG",
            Self::LMotorRot => "L-MOTOR-ROT",
            Self::MMotorDeg => "M-MOTOR-DEG",
            Self::MMotorRot => "M-MOTOR-ROT",
            Self::Touch => "TOUCH",
            Self::UsDistCm => "US-DIST-CM",
            Self::UsDistIn => "US-DIST-IN",
            Self::UsListen => "US-LISTEN",
        }
    }

    /// Logical device this token identifies (before duplicate remapping).
    pub fn device_name(self) -> DeviceName {
        match self {
            Self::ColAmbient | Self::ColColor | Self::ColReflect => DeviceName::ColorSensor,
            Self::GyroAng | Self::GyroRate => DeviceName::GyroSensor,
            Self::IrProx | Self::IrRemote | Self::IrSeek => DeviceName::IrSensor,
            Self::LMotorDeg | Self::LMotorRot => DeviceName::LargeMotor,
            Self::MMotorDeg | Self::MMotorRot => DeviceName::MediumMotor,
            Self::Touch => DeviceName::TouchSensor,
            Self::UsDistCm | Self::UsDistIn | Self::UsListen => DeviceName::UltrasonicSensor,
        }
    }

    pub fn default_mode(self) -> u8 {
        match self {
            Self::ColReflect => ColorSensorMode::Reflective as u8,
            Self::ColAmbient => ColorSensorMode::Ambient as u8,
            Self::ColColor => ColorSensorMode::Color as u8,
            Self::GyroAng => GyroMode::Angle as u8,
            Self::GyroRate => GyroMode::Rate as u8,
            Self::IrProx => IrSensorMode::Proximity as u8,
            Self::IrSeek => IrSensorMode::Seek as u8,
            Self::IrRemote => IrSensorMode::RemoteControl as u8,
            Self::LMotorDeg | Self::MMotorDeg => MotorMode::Degree as u8,
            Self::LMotorRot | Self::MMotorRot => MotorMode::Rotation as u8,
            Self::Touch => 0,
            Self::UsDistCm => UltrasonicSensorMode::DistCm as u8,
            Self::UsDistIn => UltrasonicSensorMode::DistInch as u8,
            Self::UsListen => UltrasonicSensorMode::Listen as u8,
        }
    }

    /// Display hint for UIs rendering this device's value.
    pub fn css_hint(self) -> &'static str {
        match self {
            Self::ColColor => "color",
            _ => "",
        }
    }

    pub fn read_kind(self) -> ReadKind {
        match self {
            Self::Touch => ReadKind::Pct,
            Self::GyroAng
            | Self::GyroRate
            | Self::UsDistCm
            | Self::UsDistIn
            | Self::UsListen => ReadKind::Si,
            Self::LMotorDeg | Self::LMotorRot | Self::MMotorDeg | Self::MMotorRot => {
                ReadKind::Actor
            }
            _ => ReadKind::Raw,
        }
    }
}

/// Logical device names. The `Opt` variants are the aliases a second
/// device of the same type is remapped to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum DeviceName {
    ColorSensor,
    GyroSensor,
    IrSensor,
    UltrasonicSensor,
    TouchSensor,
    TouchSensorOpt,
    LargeMotor,
    LargeMotorOpt,
    MediumMotor,
    MediumMotorOpt,
}

impl DeviceName {
    pub fn is_motor(self) -> bool {
        matches!(
            self,
            Self::LargeMotor | Self::LargeMotorOpt | Self::MediumMotor | Self::MediumMotorOpt
        )
    }

    /// Alias for a second device of the same type, for the three device
    /// types the hardware allows in duplicate.
    pub fn opt_alias(self) -> Option<DeviceName> {
        match self {
            Self::LargeMotor => Some(Self::LargeMotorOpt),
            Self::MediumMotor => Some(Self::MediumMotorOpt),
            Self::TouchSensor => Some(Self::TouchSensorOpt),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ColorSensor => "COLOR_SENSOR",
            Self::GyroSensor => "GYRO_SENSOR",
            Self::IrSensor => "IR_SENSOR",
            Self::UltrasonicSensor => "ULTRASONIC_SENSOR",
            Self::TouchSensor => "TOUCH_SENSOR",
            Self::TouchSensorOpt => "TOUCH_SENSOR_OPT",
            Self::LargeMotor => "LARGE_MOTOR",
            Self::LargeMotorOpt => "LARGE_MOTOR_OPT",
            Self::MediumMotor => "MEDIUM_MOTOR",
            Self::MediumMotorOpt => "MEDIUM_MOTOR_OPT",
        };
        f.write_str(label)
    }
}

/// Last observed reading of a device. Raw and percentage reads are bytes,
/// actor reads are 32-bit tacho counts, SI reads are calibrated floats.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DeviceValue {
    Int(i32),
    Float(f32),
}

impl fmt::Display for DeviceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Last-known state of whatever is plugged into one port.
#[derive(Clone, Debug, PartialEq)]
pub struct Device {
    pub name: DeviceName,
    pub device_type: DeviceType,
    pub mode: u8,
    pub value: DeviceValue,
    pub css_hint: &'static str,
}

impl Device {
    pub fn new(name: DeviceName, device_type: DeviceType, mode: u8, css_hint: &'static str) -> Self {
        Self {
            name,
            device_type,
            mode,
            value: DeviceValue::Int(0),
            css_hint,
        }
    }
}

/// Human-readable name for a color-mode sensor reading.
pub fn color_name(value: i32) -> Option<&'static str> {
    match value {
        0 => Some("transparent"),
        1 => Some("black"),
        2 => Some("blue"),
        3 => Some("green"),
        4 => Some("yellow"),
        5 => Some("red"),
        6 => Some("white"),
        7 => Some("brown"),
        _ => None,
    }
}
