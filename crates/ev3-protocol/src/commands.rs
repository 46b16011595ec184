//! Builders for every outgoing command, one method per brick operation.
//!
//! Read-style builders memoize their frames in the [`CommandCache`] since
//! the monitoring loop re-issues them with identical arguments. Motor
//! commands chain several instructions into one frame so stop, power and
//! start reach the brick atomically.

use crate::cache::CommandCache;
use crate::encode::CommandBuffer;
use crate::error::Result;
use crate::opcode::{CallbackType, LedColor, LedMode, Opcode};
use crate::ports::{InputPort, OutputPorts};

/// On-brick project directory for image and sound files.
const PROJECT_PATH: &str = "/home/root/lms2012/prjs/";

/// Display geometry, 178x128 pixels.
const DISPLAY_MAX_X: i32 = 177;
const DISPLAY_MAX_Y: i32 = 127;

const MIN_TONE_DURATION_MS: u16 = 50;

#[derive(Debug, Default)]
pub struct Commands {
    cache: CommandCache,
}

impl Commands {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dropped on disconnect together with the rest of the session state.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Firmware version string, 16 bytes of global space.
    pub fn get_firmware(&mut self) -> Result<Vec<u8>> {
        let key = CommandCache::key("getFirmware", &());
        if let Some(frame) = self.cache.get(&key) {
            return Ok(frame);
        }
        let frame = CommandBuffer::with_global_size(CallbackType::Firmware, 0x10)
            .write_command(Opcode::UiReadFirmware)
            .write_byte(0x10)
            .write_index()
            .read_signed()?;
        Ok(self.cache.set(key, frame))
    }

    pub fn get_battery(&mut self) -> Result<Vec<u8>> {
        let key = CommandCache::key("getBattery", &());
        if let Some(frame) = self.cache.get(&key) {
            return Ok(frame);
        }
        let frame = CommandBuffer::with_global_size(CallbackType::Battery, 0)
            .write_command(Opcode::UiReadBattery)
            .write_index()
            .read_signed()?;
        Ok(self.cache.set(key, frame))
    }

    /// Ask the brick what is plugged into one port. The answer is the raw
    /// device-type token, up to 0x7F bytes of it.
    pub fn get_device_type(&mut self, port: InputPort) -> Result<Vec<u8>> {
        let key = CommandCache::key("getDeviceType", &(port as u8));
        if let Some(frame) = self.cache.get(&key) {
            return Ok(frame);
        }
        let frame = CommandBuffer::with_global_size(CallbackType::DeviceName, 0x7F)
            .write_command(Opcode::InputDeviceGetDeviceName)
            .write_port(port)
            .write_byte(0x7F)
            .write_index()
            .read_signed()?;
        Ok(self.cache.set(key, frame))
    }

    fn read_device(
        &mut self,
        name: &str,
        callback: CallbackType,
        op: Opcode,
        port: InputPort,
        mode: u8,
    ) -> Result<Vec<u8>> {
        let key = CommandCache::key(name, &(port as u8, mode));
        if let Some(frame) = self.cache.get(&key) {
            return Ok(frame);
        }
        let frame = CommandBuffer::new(callback)
            .write_command(op)
            .write_port(port)
            .write_null_byte()
            .write_byte(mode)
            .write_single_byte()
            .write_index()
            .read_signed()?;
        Ok(self.cache.set(key, frame))
    }

    /// Raw sensor reading, a single unsigned byte.
    pub fn get_sensor_data(&mut self, port: InputPort, mode: u8) -> Result<Vec<u8>> {
        self.read_device(
            "getSensorData",
            CallbackType::DeviceRawValue,
            Opcode::InputDeviceReadRaw,
            port,
            mode,
        )
    }

    /// Percentage sensor reading.
    pub fn get_sensor_data_pct(&mut self, port: InputPort, mode: u8) -> Result<Vec<u8>> {
        self.read_device(
            "getSensorDataPct",
            CallbackType::DevicePctValue,
            Opcode::InputDeviceReadPct,
            port,
            mode,
        )
    }

    /// Calibrated SI reading, a little-endian f32.
    pub fn get_sensor_data_si(&mut self, port: InputPort, mode: u8) -> Result<Vec<u8>> {
        self.read_device(
            "getSensorDataSi",
            CallbackType::DeviceSiValue,
            Opcode::InputDeviceReadSi,
            port,
            mode,
        )
    }

    /// Motor tacho reading. Same raw read as a sensor, tagged with the
    /// actor callback so the decoder knows to take an i32.
    pub fn get_actor_data(&mut self, port: InputPort, mode: u8) -> Result<Vec<u8>> {
        self.read_device(
            "getActorData",
            CallbackType::ActorValue,
            Opcode::InputDeviceReadRaw,
            port,
            mode,
        )
    }

    /// Brick status LED. The wire value folds color and mode together.
    pub fn set_led(&self, color: LedColor, mode: LedMode) -> Result<Vec<u8>> {
        CommandBuffer::new(CallbackType::None)
            .write_command(Opcode::UiWriteLed)
            .write_byte(color as u8 + mode as u8)
            .read_signed()
    }

    /// Run motors at a constant power until told otherwise.
    pub fn move_power(&self, ports: OutputPorts, power: i8, brake: bool) -> Result<Vec<u8>> {
        CommandBuffer::new(CallbackType::None)
            .write_command(Opcode::OutputStop)
            .write_ports(ports)
            .write_byte(brake as u8)
            .write_command(Opcode::OutputPower)
            .write_ports(ports)
            .write_byte(power.clamp(-100, 100) as u8)
            .write_command(Opcode::OutputStart)
            .write_ports(ports)
            .read_signed()
    }

    /// Opposed power on two motor groups, for turning in place. The right
    /// side runs inverted.
    pub fn rotate_power(
        &self,
        port_left: OutputPorts,
        port_right: OutputPorts,
        power_left: i8,
        power_right: i8,
        brake: bool,
    ) -> Result<Vec<u8>> {
        let both = port_left | port_right;
        CommandBuffer::new(CallbackType::None)
            .write_command(Opcode::OutputStop)
            .write_ports(both)
            .write_byte(brake as u8)
            .write_command(Opcode::OutputPower)
            .write_ports(port_left)
            .write_byte(power_left.clamp(-100, 100) as u8)
            .write_command(Opcode::OutputPower)
            .write_ports(port_right)
            .write_byte((-power_right.clamp(-100, 100)) as u8)
            .write_command(Opcode::OutputStart)
            .write_ports(both)
            .read_signed()
    }

    /// Move for a fixed tacho count. STEP.SPEED schedules its own start.
    pub fn move_steps(
        &self,
        ports: OutputPorts,
        steps: i32,
        speed: i8,
        ramp_up: i32,
        ramp_down: i32,
        brake: bool,
    ) -> Result<Vec<u8>> {
        CommandBuffer::new(CallbackType::None)
            .write_command(Opcode::OutputStop)
            .write_ports(ports)
            .write_byte(brake as u8)
            .write_command(Opcode::OutputStepSpeed)
            .write_ports(ports)
            .write_byte(speed.clamp(-100, 100) as u8)
            .write_int(ramp_up)
            .write_int(steps)
            .write_int(ramp_down)
            .write_byte(brake as u8)
            .read_signed()
    }

    /// Turn in place for a fixed tacho count, right side inverted.
    #[allow(clippy::too_many_arguments)]
    pub fn rotate_steps(
        &self,
        port_left: OutputPorts,
        port_right: OutputPorts,
        steps: i32,
        speed_left: i8,
        speed_right: i8,
        ramp_up: i32,
        ramp_down: i32,
        brake: bool,
    ) -> Result<Vec<u8>> {
        CommandBuffer::new(CallbackType::None)
            .write_command(Opcode::OutputStop)
            .write_ports(port_left | port_right)
            .write_byte(brake as u8)
            .write_command(Opcode::OutputStepSpeed)
            .write_ports(port_left)
            .write_byte(speed_left.clamp(-100, 100) as u8)
            .write_int(ramp_up)
            .write_int(steps)
            .write_int(ramp_down)
            .write_byte(brake as u8)
            .write_command(Opcode::OutputStepSpeed)
            .write_ports(port_right)
            .write_byte((-speed_right.clamp(-100, 100)) as u8)
            .write_int(ramp_up)
            .write_int(steps)
            .write_int(ramp_down)
            .write_byte(brake as u8)
            .read_signed()
    }

    pub fn stop(&self, ports: OutputPorts, brake: bool) -> Result<Vec<u8>> {
        CommandBuffer::new(CallbackType::None)
            .write_command(Opcode::OutputStop)
            .write_ports(ports)
            .write_byte(brake as u8)
            .read_signed()
    }

    /// Reset all input devices on the brick.
    pub fn clear(&self) -> Result<Vec<u8>> {
        CommandBuffer::new(CallbackType::None)
            .write_command(Opcode::InputDeviceClearAll)
            .write_null_byte()
            .read_signed()
    }

    pub fn play_tone(&self, frequency: u16, duration: u16, volume: u8) -> Result<Vec<u8>> {
        CommandBuffer::new(CallbackType::None)
            .write_command(Opcode::SoundTone)
            .write_byte(volume.min(100))
            .write_short(frequency as i16)
            .write_short(duration.max(MIN_TONE_DURATION_MS) as i16)
            .read_signed()
    }

    pub fn play_sound(&self, filename: &str, volume: u8) -> Result<Vec<u8>> {
        CommandBuffer::new(CallbackType::None)
            .write_command(Opcode::SoundPlay)
            .write_byte(volume.min(100))
            .write_string(filename)
            .read_signed()
    }

    pub fn draw_clean(&self) -> Result<Vec<u8>> {
        CommandBuffer::new(CallbackType::None)
            .write_command(Opcode::UiDrawClean)
            .read_signed()
    }

    pub fn draw_update(&self) -> Result<Vec<u8>> {
        CommandBuffer::new(CallbackType::None)
            .write_command(Opcode::UiDrawUpdate)
            .read_signed()
    }

    /// Show an on-brick image file. The brick wants the project path
    /// without the `.rgf` extension.
    pub fn draw_image(&self, filename: &str, x: i32, y: i32, color: u8) -> Result<Vec<u8>> {
        let filepath = format!("{PROJECT_PATH}{}", filename.replace(".rgf", ""));
        CommandBuffer::new(CallbackType::None)
            .write_command(Opcode::UiDrawBmpFile)
            .write_byte(color)
            .write_int(x.clamp(0, DISPLAY_MAX_X))
            .write_int(y.clamp(0, DISPLAY_MAX_Y))
            .write_string(&filepath)
            .read_signed()
    }

    /// Draw a line, color 0 is white and 1 is black.
    pub fn draw_line(&self, x1: i32, y1: i32, x2: i32, y2: i32, color: u8) -> Result<Vec<u8>> {
        CommandBuffer::new(CallbackType::None)
            .write_command(Opcode::UiDrawLine)
            .write_byte(color)
            .write_int(x1.clamp(0, DISPLAY_MAX_X))
            .write_int(y1.clamp(0, DISPLAY_MAX_Y))
            .write_int(x2.clamp(0, DISPLAY_MAX_X))
            .write_int(y2.clamp(0, DISPLAY_MAX_Y))
            .read_signed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn led_green_flash() {
        let commands = Commands::new();
        let frame = commands.set_led(LedColor::Green, LedMode::Flash).unwrap();
        assert_eq!(
            frame,
            vec![0x09, 0x00, 0x00, 0x00, 0x80, 0x04, 0x00, 0x82, 0x1B, 0x81, 0x04]
        );
    }

    #[test]
    fn sensor_read_is_cached() {
        let mut commands = Commands::new();
        let first = commands.get_sensor_data(InputPort::Two, 0x02).unwrap();
        let second = commands.get_sensor_data(InputPort::Two, 0x02).unwrap();
        assert_eq!(first, second);
        let other_mode = commands.get_sensor_data(InputPort::Two, 0x00).unwrap();
        assert_ne!(first, other_mode);
        assert_eq!(
            first,
            vec![
                0x13, 0x00, 0x11, 0x01, 0x00, 0x04, 0x00, 0x99, 0x1C, 0x81, 0x00, 0x81, 0x01,
                0x81, 0x00, 0x81, 0x02, 0x81, 0x01, 0xE1, 0x00,
            ]
        );
    }

    #[test]
    fn firmware_and_battery_reserve_global_space() {
        let mut commands = Commands::new();
        let firmware = commands.get_firmware().unwrap();
        assert_eq!(firmware[2], CallbackType::Firmware as u8);
        assert_eq!(firmware[5], 0x10);
        let battery = commands.get_battery().unwrap();
        assert_eq!(battery[2], CallbackType::Battery as u8);
        assert_eq!(battery[5], 0x00);
    }

    #[test]
    fn device_scan_targets_the_port() {
        let mut commands = Commands::new();
        let frame = commands.get_device_type(InputPort::C).unwrap();
        assert_eq!(frame[2], CallbackType::DeviceName as u8);
        assert_eq!(frame[3], 0x12);
        assert_eq!(frame[5], 0x7F);
    }

    #[test]
    fn actor_read_reuses_raw_opcode() {
        let mut commands = Commands::new();
        let frame = commands.get_actor_data(InputPort::A, 0x00).unwrap();
        assert_eq!(frame[2], CallbackType::ActorValue as u8);
        assert_eq!(&frame[7..9], &[0x99, 0x1C]);
    }

    #[test]
    fn move_power_chains_stop_power_start() {
        let commands = Commands::new();
        let frame = commands.move_power(OutputPorts::B | OutputPorts::C, 120, false).unwrap();
        // Clamped to 100, three instructions in one frame.
        assert_eq!(
            &frame[7..],
            &[
                0xA3, 0x81, 0x00, 0x81, 0x06, 0x81, 0x00, // stop, no brake
                0xA4, 0x81, 0x00, 0x81, 0x06, 0x81, 0x64, // power 100
                0xA6, 0x81, 0x00, 0x81, 0x06, // start
            ]
        );
    }

    #[test]
    fn rotate_power_inverts_right_side() {
        let commands = Commands::new();
        let frame = commands
            .rotate_power(OutputPorts::B, OutputPorts::C, 40, 40, true)
            .unwrap();
        let power_bytes: Vec<u8> = frame
            .windows(2)
            .filter(|w| w[0] == 0x81 && (w[1] == 40 || w[1] == 216))
            .map(|w| w[1])
            .collect();
        assert_eq!(power_bytes, vec![40, 216]); // 216 == -40 as u8
    }

    #[test]
    fn tone_duration_has_a_floor() {
        let commands = Commands::new();
        let frame = commands.play_tone(440, 10, 255).unwrap();
        // volume clamped to 100, duration raised to 50 ms
        assert_eq!(&frame[7..], &[0x94, 0x01, 0x81, 0x64, 0x82, 0xB8, 0x01, 0x82, 0x32, 0x00]);
    }

    #[test]
    fn draw_image_expands_the_project_path() {
        let commands = Commands::new();
        let frame = commands.draw_image("smile.rgf", 300, -5, 1).unwrap();
        let text = String::from_utf8_lossy(&frame).into_owned();
        assert!(text.contains("/home/root/lms2012/prjs/smile"));
        assert!(!text.contains(".rgf"));
        // x clamped to 177, y to 0
        assert_eq!(&frame[11..21], &[0x83, 0xB1, 0x00, 0x00, 0x00, 0x83, 0x00, 0x00, 0x00, 0x00]);
    }
}
