//! Configuration for the chatlink realtime layer
//!
//! Reconnect pacing, heartbeat cadence and channel buffer sizes. Defaults
//! use a fixed retry cap rather than an unlimited loop.

use core::time::Duration;
use rand::Rng;

// ----------------------------------------------------------------------------
// Reconnect Configuration
// ----------------------------------------------------------------------------

/// Backoff bounds for automatic reconnection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound on the exponential delay (before jitter)
    pub max_delay: Duration,
    /// Number of failed attempts after which the connection goes terminal
    pub max_retries: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_retries: 8,
        }
    }
}

impl ReconnectConfig {
    /// Exponential delay for a retry attempt, without jitter
    ///
    /// `min(max_delay, base_delay * 2^retry_count)`, non-decreasing in
    /// `retry_count`.
    pub fn delay_for_attempt(&self, retry_count: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        let multiplier = 1u64.checked_shl(retry_count).unwrap_or(u64::MAX);
        Duration::from_millis(base_ms.saturating_mul(multiplier).min(max_ms))
    }

    /// Delay for a retry attempt with uniform jitter from `[0, delay)`
    pub fn jittered_delay<R: Rng>(&self, retry_count: u32, rng: &mut R) -> Duration {
        let delay = self.delay_for_attempt(retry_count);
        let delay_ms = delay.as_millis() as u64;
        if delay_ms == 0 {
            return delay;
        }
        let jitter_ms = rng.gen_range(0..delay_ms);
        delay + Duration::from_millis(jitter_ms)
    }
}

// ----------------------------------------------------------------------------
// Heartbeat Configuration
// ----------------------------------------------------------------------------

/// Cadence of presence/inbox heartbeats while the connection is online
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval between pings; the first ping fires immediately on Online
    pub interval: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
        }
    }
}

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

/// Buffer sizes for the runtime channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Inbound wire frames (transport -> consumer)
    pub inbound_buffer_size: usize,
    /// Consumer commands (handle -> actor)
    pub command_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            inbound_buffer_size: 128,
            command_buffer_size: 32,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
