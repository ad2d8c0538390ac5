// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Client-configurable constants. Defaults match §6 of the design exactly;
// this exists so a test harness can point at an alternate socket path
// without patching the crate.

use std::time::Duration;

/// Default control-socket path, matching `SocketIPC._rem_addr` in the
/// original implementation.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/sing_ipc_socket";

/// Number of *additional* connect attempts after the first one fails with
/// connection-refused (so four attempts total).
pub const DEFAULT_CONNECT_RETRIES: u32 = 3;

/// Delay between connection-refused retries.
pub const DEFAULT_CONNECT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Tunable parameters for a [`crate::Client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub socket_path: String,
    pub connect_retries: u32,
    pub connect_retry_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socket_path: DEFAULT_SOCKET_PATH.to_string(),
            connect_retries: DEFAULT_CONNECT_RETRIES,
            connect_retry_delay: DEFAULT_CONNECT_RETRY_DELAY,
        }
    }
}
