use uuid::Uuid;

/**
 * Advertised name prefix of HC-05 / HM-10 style serial modules.
 */
pub const DEVICE_NAME_PREFIX: &str = "HC";

/**
 * The UUID of the Bluetooth BLE service exposing the serial bridge.
 */
pub const SERIAL_SERVICE: &str = "0000ffe0-0000-1000-8000-00805f9b34fb";

/**
 * The UUID of the read/write/notify characteristic carrying the serial data.
 */
pub const SERIAL_DATA_CHARACTERISTIC: &str = "0000ffe1-0000-1000-8000-00805f9b34fb";

/**
 * How long (milliseconds) to scan for a matching peripheral before giving up.
 */
pub const SCAN_TIMEOUT: u64 = 10_000;

/**
 * How often (milliseconds) the scan results are polled while choosing a device.
 */
pub const SCAN_POLL_DELAY: u64 = 250;

/**
 * How long (milliseconds) a write to a characteristic may take.
 */
pub const WRITE_DEADLINE: u64 = 2000;

/**
 * How long (milliseconds) tearing down a link may take. Disconnecting can hang on some platforms
 * (see macOS `is_connected`), the link is abandoned after this deadline.
 */
pub const CLOSE_DEADLINE: u64 = 2000;

/**
 * Name reported for peripherals that do not advertise one.
 */
pub const UNKNOWN_DEVICE_NAME: &str = "Unknown device";

pub const SERIAL_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000ffe0_0000_1000_8000_00805f9b34fb);
pub const SERIAL_DATA_UUID: Uuid = Uuid::from_u128(0x0000ffe1_0000_1000_8000_00805f9b34fb);
