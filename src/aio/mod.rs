//! Adafruit IO protocol clients

pub mod http;
pub mod json;
pub mod mqtt;
pub mod packet;
