//! Constants for pushing records to the remote (timeouts).

/// Connect timeout for the remote server (10 seconds).
pub const SEND_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Whole-request timeout for one record delivery (30 seconds).
pub const SEND_REQUEST_TIMEOUT_SECS: u64 = 30;
