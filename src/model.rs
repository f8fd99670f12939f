// Model of the telemetry shown by this app

use core::fmt::Write;

use heapless::String;

use crate::error::Error;

/// One of the three readings on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Temperature,
    Humidity,
    Gas,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Temperature, Channel::Humidity, Channel::Gas];
}

/// Feed keys and the gas unit used by one firmware variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedSet {
    pub temperature: &'static str,
    pub humidity: &'static str,
    pub gas: &'static str,
    pub gas_unit: &'static str,
}

/// Feeds pushed over MQTT. The gas sensor reports a resistance index.
pub const SUBSCRIPTION_FEEDS: FeedSet = FeedSet {
    temperature: "plant-temperature",
    humidity: "plant-humidity",
    gas: "plant-gas-index",
    gas_unit: "\u{03a9}",
};

/// Feeds polled over HTTP. The gas sensor reports CO2.
pub const POLLING_FEEDS: FeedSet = FeedSet {
    temperature: "plant-temperature",
    humidity: "plant-humidity",
    gas: "plant-co2",
    gas_unit: "ppm",
};

impl FeedSet {
    pub fn key(&self, channel: Channel) -> &'static str {
        match channel {
            Channel::Temperature => self.temperature,
            Channel::Humidity => self.humidity,
            Channel::Gas => self.gas,
        }
    }

    pub fn keys(&self) -> [&'static str; 3] {
        Channel::ALL.map(|channel| self.key(channel))
    }

    pub fn channel_for(&self, feed: &str) -> Option<Channel> {
        Channel::ALL
            .into_iter()
            .find(|channel| self.key(*channel) == feed)
    }

    /// Parse a raw feed payload and format it for its widget.
    pub fn render(&self, channel: Channel, payload: &str) -> Result<String<32>, Error> {
        let raw = parse_value(payload)?;
        let mut text = String::new();
        let written = match channel {
            Channel::Temperature => write!(text, "{} F\u{00b0}", celsius_to_fahrenheit(raw)?),
            Channel::Humidity => write!(text, "{} %", round_half_even(raw)?),
            Channel::Gas => write!(text, "{} {}", round_half_even(raw)?, self.gas_unit),
        };
        written.map_err(|_| Error::Value("reading does not fit on screen"))?;
        Ok(text)
    }
}

/// Parse a textual numeric feed value.
pub fn parse_value(payload: &str) -> Result<f64, Error> {
    let value: f64 = payload
        .trim()
        .parse()
        .map_err(|_| Error::Value("feed value is not a number"))?;
    if !value.is_finite() {
        return Err(Error::Value("feed value is not finite"));
    }
    Ok(value)
}

/// Largest magnitude that still rounds exactly (2^53).
const MAX_EXACT: f64 = 9_007_199_254_740_992.0;

/// Round to the nearest integer, halves to even.
pub fn round_half_even(value: f64) -> Result<i64, Error> {
    if !(value.abs() <= MAX_EXACT) {
        return Err(Error::Value("feed value out of range"));
    }
    let truncated = value as i64;
    let floor = if (truncated as f64) > value {
        truncated - 1
    } else {
        truncated
    };
    let fraction = value - floor as f64;
    let rounded = if fraction > 0.5 || (fraction == 0.5 && floor % 2 != 0) {
        floor + 1
    } else {
        floor
    };
    Ok(rounded)
}

/// Whole-degree Celsius reading converted to whole-degree Fahrenheit.
///
/// The reading is rounded before conversion, so 21.6 shows as 72 rather
/// than the 71 a direct `round(1.8 * c + 32)` would give.
pub fn celsius_to_fahrenheit(celsius: f64) -> Result<i64, Error> {
    let whole = round_half_even(celsius)? as f64;
    round_half_even(1.8 * whole + 32.0)
}
