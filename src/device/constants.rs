use uuid::Uuid;

/**
 * How long (milliseconds) connecting to a peripheral may take.
 */
pub const CONNECT_DEADLINE: u64 = 10000;

/**
 * How long (milliseconds) service discovery may take.
 */
pub const DISCOVERY_DEADLINE: u64 = 5000;

/**
 * How long (milliseconds) enabling or disabling notifications on a characteristic may take.
 */
pub const NOTIFY_DEADLINE: u64 = 2000;

/**
 * How long (milliseconds) a disconnect may take.
 */
pub const DISCONNECT_DEADLINE: u64 = 2000;

/**
 * How long (seconds) the command line client scans before giving up. Matches the refresh timer
 * of the peripheral list in the mobile app.
 */
pub const DEFAULT_SCAN_TIMEOUT_SECS: u64 = 20;

/**
 * Yaw, pitch and roll are transmitted as integer hundredths of a degree.
 */
pub const DEFAULT_HUNDREDTHS_PER_DEGREE: f32 = 100.0;

/**
 * Number of transport events that may be queued before transport tasks have to wait.
 */
pub const TRANSPORT_EVENT_BUFFER: usize = 128;

/**
 * Number of session events that may be queued for a ChannelSink consumer before events are dropped.
 */
pub const SESSION_EVENT_BUFFER: usize = 64;

/**
 * The GATT service advertised by the Arduino 101 orientation sketch.
 */
pub const ORIENTATION_SERVICE: Uuid = Uuid::from_u128(0x7c27a67c_8e46_4ae6_8bc0_8a0865e7293f);

/**
 * Raw gyroscope axis characteristics (first firmware revision).
 */
pub const GYRO_X_CHARACTERISTIC: Uuid = Uuid::from_u128(0xff125ea1_e5b1_4323_9913_957826eb5059);
pub const GYRO_Y_CHARACTERISTIC: Uuid = Uuid::from_u128(0x24676112_6e73_4159_90e1_147288dd11dd);
pub const GYRO_Z_CHARACTERISTIC: Uuid = Uuid::from_u128(0x593dcd1b_749b_4697_8dc3_709eed98887b);

/**
 * Fused orientation characteristics, in hundredths of a degree. The published sketch does not
 * expose these; set the real ones through the `characteristicUuids` config entry.
 */
pub const YAW_CHARACTERISTIC: Uuid = Uuid::from_u128(0x8801dfbd_ee66_458c_809f_a2878d53f19d);
pub const PITCH_CHARACTERISTIC: Uuid = Uuid::from_u128(0xfdf82f83_86c9_4d52_ab7c_032e064acdf9);
pub const ROLL_CHARACTERISTIC: Uuid = Uuid::from_u128(0x7d31beb3_a6b5_49a0_a03b_bb9f8a0de6a9);
