//! Outgoing direct-command encoder.
//!
//! A frame is `[len_lo, len_hi, callback, target, body...]` where the length
//! field counts the body plus the two spare header bytes. The body opens
//! with a 3-byte instruction header (command type, global variable size) and
//! is followed by opcodes and size-prefixed operands. The encoder performs
//! no semantic validation; argument clamping lives in the command builders.

use crate::error::{ProtocolError, Result};
use crate::opcode::{
    CallbackType, Opcode, DIRECT_NOREPLY, DIRECT_REPLY, PARAM_BYTE, PARAM_INDEX, PARAM_INT,
    PARAM_SHORT, PARAM_STRING,
};
use crate::ports::{InputPort, OutputPorts};

/// Fluent builder for one outgoing frame. Consumed by [`read_signed`].
///
/// [`read_signed`]: CommandBuffer::read_signed
#[derive(Clone, Debug)]
pub struct CommandBuffer {
    callback: CallbackType,
    target: u8,
    body: Vec<u8>,
    instructions: usize,
}

impl CommandBuffer {
    /// Start a buffer with the default global variable size of 4 bytes.
    pub fn new(callback: CallbackType) -> Self {
        Self::with_global_size(callback, 0x04)
    }

    /// Start a buffer with an explicit global variable size. Firmware reads
    /// use 0x10, device-name scans 0x7F, battery reads 0.
    pub fn with_global_size(callback: CallbackType, global_size: u16) -> Self {
        let command_type = if callback == CallbackType::None {
            DIRECT_NOREPLY
        } else {
            DIRECT_REPLY
        };
        // Local size is always zero here, so the third header byte only
        // carries the global size overflow bits.
        let body = vec![
            command_type,
            (global_size & 0xFF) as u8,
            ((global_size >> 8) & 0x03) as u8,
        ];
        Self {
            callback,
            target: InputPort::One as u8,
            body,
            instructions: 0,
        }
    }

    /// Append an opcode's raw bytes.
    pub fn write_command(mut self, op: Opcode) -> Self {
        self.body.extend_from_slice(op.bytes());
        self.instructions += 1;
        self
    }

    /// Append a byte operand with its size prefix. Signed values are passed
    /// as their two's-complement byte.
    pub fn write_byte(mut self, value: u8) -> Self {
        self.body.push(PARAM_BYTE);
        self.body.push(value);
        self
    }

    pub fn write_short(mut self, value: i16) -> Self {
        self.body.push(PARAM_SHORT);
        self.body.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn write_int(mut self, value: i32) -> Self {
        self.body.push(PARAM_INT);
        self.body.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Append a NUL-terminated ASCII string operand.
    pub fn write_string(mut self, value: &str) -> Self {
        self.body.push(PARAM_STRING);
        self.body.extend_from_slice(value.as_bytes());
        self.body.push(0x00);
        self
    }

    /// Headered zero byte, used for the layer operand and zero defaults.
    pub fn write_null_byte(self) -> Self {
        self.write_byte(0x00)
    }

    /// Headered one byte, used for single-value read counts.
    pub fn write_single_byte(self) -> Self {
        self.write_byte(0x01)
    }

    /// Global variable index operand, always slot zero here.
    pub fn write_index(mut self) -> Self {
        self.body.push(PARAM_INDEX);
        self.body.push(0x00);
        self
    }

    /// Layer byte plus the port operand. The port doubles as the callback
    /// target echoed back in the reply header.
    pub fn write_port(mut self, port: InputPort) -> Self {
        self.target = port as u8;
        self.write_null_byte().write_byte(port as u8)
    }

    /// Layer byte plus an output-port bitmask. Does not touch the callback
    /// target, masks address fire-and-forget motor commands.
    pub fn write_ports(self, ports: OutputPorts) -> Self {
        self.write_null_byte().write_byte(ports.bits())
    }

    /// Finalize into the wire frame.
    pub fn read_signed(self) -> Result<Vec<u8>> {
        if self.instructions == 0 {
            return Err(ProtocolError::EmptyCommand);
        }
        let len = self.body.len() + 2;
        let mut frame = Vec::with_capacity(len + 2);
        frame.push((len & 0xFF) as u8);
        frame.push(((len >> 8) & 0xFF) as u8);
        frame.push(self.callback as u8);
        frame.push(self.target);
        frame.extend_from_slice(&self.body);
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn led_frame_matches_wire_format() {
        let frame = CommandBuffer::new(CallbackType::None)
            .write_command(Opcode::UiWriteLed)
            .write_byte(0x04)
            .read_signed()
            .unwrap();
        assert_eq!(
            frame,
            vec![0x09, 0x00, 0x00, 0x00, 0x80, 0x04, 0x00, 0x82, 0x1B, 0x81, 0x04]
        );
    }

    #[test]
    fn raw_read_frame_carries_callback_and_target() {
        let frame = CommandBuffer::new(CallbackType::DeviceRawValue)
            .write_command(Opcode::InputDeviceReadRaw)
            .write_port(InputPort::Two)
            .write_null_byte()
            .write_byte(0x02)
            .write_single_byte()
            .write_index()
            .read_signed()
            .unwrap();
        assert_eq!(
            frame,
            vec![
                0x13, 0x00, 0x11, 0x01, // length, callback, target
                0x00, 0x04, 0x00, // reply expected, 4 global bytes
                0x99, 0x1C, // READRAW
                0x81, 0x00, 0x81, 0x01, // layer, port
                0x81, 0x00, 0x81, 0x02, 0x81, 0x01, // type, mode, one value
                0xE1, 0x00, // global index
            ]
        );
    }

    #[test]
    fn wide_global_size_spills_into_third_header_byte() {
        let frame = CommandBuffer::with_global_size(CallbackType::DeviceName, 0x17F)
            .write_command(Opcode::InputDeviceGetDeviceName)
            .read_signed()
            .unwrap();
        assert_eq!(&frame[4..7], &[0x00, 0x7F, 0x01]);
    }

    #[test]
    fn empty_buffer_is_rejected() {
        let err = CommandBuffer::new(CallbackType::None).read_signed();
        assert_eq!(err, Err(ProtocolError::EmptyCommand));
    }

    #[test]
    fn negative_operands_encode_twos_complement() {
        let frame = CommandBuffer::new(CallbackType::None)
            .write_command(Opcode::OutputPower)
            .write_ports(OutputPorts::B | OutputPorts::C)
            .write_byte((-100i8) as u8)
            .read_signed()
            .unwrap();
        assert_eq!(&frame[8..], &[0x81, 0x00, 0x81, 0x06, 0x81, 0x9C]);
    }
}
