use crate::opcode::CallbackType;
use crate::ports::InputPort;
use crate::types::DeviceName;
use thiserror::Error;

pub type Result<T, E = ProtocolError> = core::result::Result<T, E>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("command buffer contains no instructions")]
    EmptyCommand,
    #[error("truncated response frame ({len} bytes, minimum is 5)")]
    TruncatedFrame { len: usize },
    #[error("unknown device type {0:?}")]
    UnknownDeviceType(String),
    #[error("hardware fault on port {0}, restart the brick")]
    PortFault(InputPort),
    #[error("wiring problem on port {0}, check the cable")]
    WiringFault(InputPort),
    #[error("device {name} is already registered on another port")]
    DuplicateDeviceCollision { name: DeviceName, port: InputPort },
    #[error("a {callback:?} read is already in flight for port {port:#04x}")]
    ConcurrentRequestConflict { callback: CallbackType, port: u8 },
    #[error("not connected to a brick")]
    NotConnected,
    #[error("internal state error: {0}")]
    Internal(&'static str),
}
