//! Build-time credentials and runtime tunables
//!
//! Credentials come from the build environment:
//! - WIFI_SSID / WIFI_PASSWORD: wireless network
//! - AIO_USERNAME / AIO_KEY: Adafruit IO account

use crate::error::Error;
use crate::retry::RetryPolicy;

pub const AIO_HOST: &str = "io.adafruit.com";
/// HTTPS
pub const AIO_HTTPS_PORT: u16 = 443;
/// MQTT over TLS
pub const AIO_MQTTS_PORT: u16 = 8883;

/// Account and network credentials.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub wifi_ssid: &'static str,
    pub wifi_password: &'static str,
    pub aio_username: &'static str,
    pub aio_key: &'static str,
}

impl Config {
    /// Read the credentials baked in at build time.
    ///
    /// Missing values are left empty and show up later as a failed join or a
    /// rejected request. Only the username is checked here since it is part
    /// of every topic and path.
    pub fn load() -> Result<Self, Error> {
        Self::from_parts(
            option_env!("WIFI_SSID").unwrap_or(""),
            option_env!("WIFI_PASSWORD").unwrap_or(""),
            option_env!("AIO_USERNAME").unwrap_or(""),
            option_env!("AIO_KEY").unwrap_or(""),
        )
    }

    pub fn from_parts(
        wifi_ssid: &'static str,
        wifi_password: &'static str,
        aio_username: &'static str,
        aio_key: &'static str,
    ) -> Result<Self, Error> {
        if aio_username.is_empty() {
            return Err(Error::Config("AIO_USERNAME is not set"));
        }
        if aio_username.contains(['/', ' ', '#', '+']) {
            return Err(Error::Config("AIO_USERNAME contains reserved characters"));
        }
        Ok(Self {
            wifi_ssid,
            wifi_password,
            aio_username,
            aio_key,
        })
    }
}

/// Timing and retry knobs for the main loop.
#[derive(Debug, Clone, Copy)]
pub struct Settings {
    /// Minimum spacing between feed polls (polling variant)
    pub poll_interval_ms: u64,
    /// Length of one clock tick
    pub tick_ms: u64,
    /// Sleep at the end of every loop iteration
    pub loop_delay_ms: u64,
    /// MQTT keep-alive announced to the broker
    pub keep_alive_secs: u16,
    /// How long one pump waits for incoming packets
    pub pump_wait_ms: u64,
    /// How long to wait for the broker's CONNACK
    pub connect_timeout_ms: u64,
    /// Startup network join
    pub join_retry: RetryPolicy,
    /// Main-loop recovery after a transient error
    pub recovery_retry: RetryPolicy,
}

impl Settings {
    pub const fn new() -> Self {
        Self {
            poll_interval_ms: 10_000,
            tick_ms: 1_000,
            loop_delay_ms: 500,
            keep_alive_secs: 60,
            pump_wait_ms: 100,
            connect_timeout_ms: 10_000,
            join_retry: RetryPolicy::forever(),
            recovery_retry: RetryPolicy::forever(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}
