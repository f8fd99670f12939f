//! Error type shared by the service clients and the main loop

use core::fmt;

/// Everything that can go wrong between the radio and the screen.
///
/// The first four variants are what the main loop recovers from by resetting
/// the radio. `Config` and `Rejected` mean retrying cannot help.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A payload or response could not be parsed
    Value(&'static str),
    /// The service answered, but not usefully (throttled, server error, ...)
    Runtime(&'static str),
    /// Network association, DNS, TCP or broker session failure
    Connection(&'static str),
    /// Socket or display write/read failure
    Io(&'static str),
    /// Build-time configuration is unusable
    Config(&'static str),
    /// The service refused the request with this status (bad key, unknown feed)
    Rejected(u16),
}

impl Error {
    /// True for the errors the main loop answers with a radio reset.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Value(_) | Error::Runtime(_) | Error::Connection(_) | Error::Io(_)
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Value(msg) => write!(f, "value error: {}", msg),
            Error::Runtime(msg) => write!(f, "runtime error: {}", msg),
            Error::Connection(msg) => write!(f, "connection error: {}", msg),
            Error::Io(msg) => write!(f, "I/O error: {}", msg),
            Error::Config(msg) => write!(f, "configuration error: {}", msg),
            Error::Rejected(status) => write!(f, "request rejected with status {}", status),
        }
    }
}

impl core::error::Error for Error {}
