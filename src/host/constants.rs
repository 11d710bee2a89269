//! Constants for the host downloader (paths, timeouts).

/// Default device address when none is configured.
pub const DEFAULT_HOST: &str = "http://192.168.4.1";

/// Paths probed in order on the device. Firmware versions expose the data
/// under different names.
pub const CANDIDATE_PATHS: [&str; 5] = [
    "/data",
    "/registros.jsonl",
    "/registros.json",
    "/data.json",
    "/",
];

/// Path used to acknowledge a completed download to the device.
pub const CONFIRM_PATH: &str = "/confirmar";

/// Default whole-request timeout for downloads (10 seconds).
pub const DEFAULT_DOWNLOAD_TIMEOUT_MS: u64 = 10_000;

/// Default whole-request timeout for confirmations (5 seconds).
pub const DEFAULT_CONFIRM_TIMEOUT_MS: u64 = 5_000;

/// Native transport connect timeout (15 seconds).
pub const NATIVE_CONNECT_TIMEOUT_SECS: u64 = 15;

/// Native transport read timeout (15 seconds).
pub const NATIVE_READ_TIMEOUT_SECS: u64 = 15;

/// `Accept` header sent by the native transport.
pub const NATIVE_ACCEPT: &str = "text/plain, application/json";
