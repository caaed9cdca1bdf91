//! Inter-process plumbing: socket framing, daemon server, producer client
//!
//! Producers and viewers talk to the daemon over a user-scoped Unix domain
//! socket carrying newline-framed JSON. The path resolves from the CLI flag,
//! then `MORGANA_SOCKET`, then the built-in default.

use std::path::PathBuf;

pub mod client;
pub mod frame;
pub mod server;

pub use client::{ClientError, ProducerClient};
pub use frame::{
    DEFAULT_HISTORY_LIMIT, Frame, FrameError, HistoryRequest, MAX_FRAME_BYTES, decode_frame, encode_frame,
    read_frame, write_frame,
};
pub use server::IpcServer;

/// Built-in socket location
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/morgana.sock";

/// Environment override for the socket path
pub const SOCKET_ENV: &str = "MORGANA_SOCKET";

/// Resolve the socket path from the environment, falling back to the default
pub fn default_socket_path() -> PathBuf {
    match std::env::var(SOCKET_ENV) {
        Ok(path) if !path.is_empty() => PathBuf::from(path),
        _ => PathBuf::from(DEFAULT_SOCKET_PATH),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_default_socket_path() {
        unsafe { std::env::remove_var(SOCKET_ENV) };
        assert_eq!(default_socket_path(), PathBuf::from("/tmp/morgana.sock"));
    }

    #[test]
    #[serial]
    fn test_env_overrides_socket_path() {
        unsafe { std::env::set_var(SOCKET_ENV, "/tmp/custom-morgana.sock") };
        assert_eq!(default_socket_path(), PathBuf::from("/tmp/custom-morgana.sock"));
        unsafe { std::env::remove_var(SOCKET_ENV) };
    }
}
