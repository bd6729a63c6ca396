// Frame layout
pub const START_BYTE: u8 = 0xFF;
pub const FRAME_LEN: usize = 7;

// Command constants (cmd1 is zero for every motion command)
pub const CMD1_NONE: u8 = 0x00;
pub const CMD2_STOP: u8 = 0x00;
pub const CMD2_PAN_RIGHT: u8 = 0x02;
pub const CMD2_PAN_LEFT: u8 = 0x04;
pub const CMD2_TILT_UP: u8 = 0x08;
pub const CMD2_TILT_DOWN: u8 = 0x10;

// Speed constants
pub const MIN_SPEED: u8 = 1;
pub const MAX_SPEED: u8 = 63;
pub const DEFAULT_SPEED: u8 = 32;

// Serial link defaults
pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";
pub const DEFAULT_BAUD_RATE: u32 = 9600;
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

// Hold repeat cadence
pub const REPEAT_INTERVAL_MS: u64 = 100;

pub const DEFAULT_DIRECTORY_FILE: &str = "config.json";
