#![cfg_attr(not(test), no_std)]

pub mod aio;
pub mod clock;
pub mod config;
pub mod display;
pub mod error;
pub mod logic;
pub mod model;
pub mod retry;
pub mod runner;
pub mod scene;
pub mod traits;

#[cfg(feature = "device")]
pub mod board;
#[cfg(feature = "device")]
pub mod hardware;
#[cfg(feature = "device")]
pub mod net;
#[cfg(feature = "device")]
pub mod wifi;

pub use error::Error;
