//! # Runtime Configuration Module
//!
//! Environment variable based configuration for the engine's runtime knobs.
//!
//! ## Environment Variables
//!
//! ### `STRAND_STACK_SIZE`
//!
//! Stack size for spawned coroutines. Accepts decimal (`16384`) or
//! hexadecimal (`0x4000`) values. Default: `0x4000` (16 KB).
//!
//! ### `STRAND_CHUNK_SIZE`
//!
//! Read size in bytes for chunked static streaming. Default: `16384`.
//!
//! ### `STRAND_POLL_INTERVAL_MS`
//!
//! How long an idle broadcast listener waits before polling its queue again
//! while the producer is still live. Default: `250`.
//!
//! ## Usage
//!
//! ```rust
//! use webstrand::runtime_config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env();
//! println!("chunk size: {} bytes", config.chunk_size);
//! ```

use std::env;
use std::time::Duration;

const DEFAULT_STACK_SIZE: usize = 0x4000;
const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;
const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    /// Stack size for coroutines in bytes (default: 16 KB / 0x4000)
    pub stack_size: usize,
    /// Chunk size for static streaming reads (default: 16 KB)
    pub chunk_size: usize,
    /// Poll interval for idle broadcast listeners (default: 250 ms)
    pub poll_interval: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            stack_size: DEFAULT_STACK_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let stack_size = env::var("STRAND_STACK_SIZE")
            .ok()
            .and_then(|v| parse_size(&v))
            .unwrap_or(DEFAULT_STACK_SIZE);

        let chunk_size = env::var("STRAND_CHUNK_SIZE")
            .ok()
            .and_then(|v| parse_size(&v))
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_CHUNK_SIZE);

        let poll_interval_ms = env::var("STRAND_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS);

        RuntimeConfig {
            stack_size,
            chunk_size,
            poll_interval: Duration::from_millis(poll_interval_ms),
        }
    }
}

/// Parse a size value in decimal or `0x`-prefixed hexadecimal.
fn parse_size(val: &str) -> Option<usize> {
    if let Some(hex) = val.strip_prefix("0x") {
        usize::from_str_radix(hex, 16).ok()
    } else {
        val.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size_decimal_and_hex() {
        assert_eq!(parse_size("16384"), Some(16384));
        assert_eq!(parse_size("0x4000"), Some(16384));
        assert_eq!(parse_size("banana"), None);
    }

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.chunk_size, 16 * 1024);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
    }
}
