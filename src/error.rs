//! Error types for modlink
//!
//! One `thiserror` enum for the whole crate plus a `Result` alias.
//! Background threads never propagate errors across thread boundaries;
//! everything here is surfaced synchronously to the calling thread.

use thiserror::Error;

/// Result type alias for modlink operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the messaging fabric
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Configuration
    // ─────────────────────────────────────────────────────────────
    /// Configuration parse error
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// Configuration validation error
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String },

    // ─────────────────────────────────────────────────────────────
    // IO / Transport
    // ─────────────────────────────────────────────────────────────
    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport used before a successful `init`
    #[error("Transport not connected")]
    NotConnected,

    /// Outgoing frame exceeds the configured maximum
    #[error("Frame of {size} bytes exceeds maximum of {max}")]
    FrameTooLarge { size: usize, max: usize },

    // ─────────────────────────────────────────────────────────────
    // Addressing / Messaging
    // ─────────────────────────────────────────────────────────────
    /// No transport registered for the destination in the requested
    /// durability class
    #[error("No route to module {destination} (durable={durable})")]
    NoRoute { destination: u8, durable: bool },

    /// Application traffic on the tag reserved for remote calls
    #[error("Tag {tag} is reserved for remote calls")]
    ReservedTag { tag: u8 },

    /// All 256 correlation ids have calls in flight
    #[error("Remote call table exhausted: all correlation ids are in flight")]
    CallTableExhausted,

    /// Remote call got no response within the fixed call timeout
    #[error("Remote call to module {destination} timed out")]
    CallTimeout { destination: u8 },

    // ─────────────────────────────────────────────────────────────
    // Protocol
    // ─────────────────────────────────────────────────────────────
    /// Structurally invalid wire data
    #[error("Malformed {kind} frame: {reason}")]
    Malformed { kind: &'static str, reason: String },
}

impl Error {
    /// Create a config validation error
    pub fn config_validation(message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
        }
    }

    /// Create a malformed-frame error
    pub fn malformed(kind: &'static str, reason: impl Into<String>) -> Self {
        Error::Malformed {
            kind,
            reason: reason.into(),
        }
    }

    /// Whether retrying the same operation can reasonably succeed.
    ///
    /// Addressing failures clear up after a discovery scan; IO errors are
    /// transient by the transport contract. Protocol and configuration
    /// failures are not retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::NoRoute { .. }
                | Error::NotConnected
                | Error::CallTableExhausted
                | Error::CallTimeout { .. }
        )
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_route_display() {
        let err = Error::NoRoute {
            destination: 7,
            durable: true,
        };
        assert_eq!(err.to_string(), "No route to module 7 (durable=true)");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::NotConnected.is_retryable());
        assert!(Error::NoRoute { destination: 1, durable: true }.is_retryable());
        assert!(!Error::ReservedTag { tag: 100 }.is_retryable());
        assert!(!Error::malformed("envelope", "short header").is_retryable());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        let err: Error = io_err.into();
        assert!(err.is_retryable());
    }
}
