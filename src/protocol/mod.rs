//! Wire protocol definitions
//!
//! The two envelope shapes that cross the network (module-to-module
//! messages and remote-call request/response), plus the constants both
//! the messaging core and the RPC layer share.
//!
//! All multi-byte fields are big-endian.

pub mod call;
pub mod envelope;

use std::fmt;

pub use call::{CallFrame, CallRequest, CallResponse};
pub use envelope::{Envelope, MessageKind};

/// Module identifier on the fabric (process-wide identity and
/// addressing are both 8-bit).
pub type ModuleId = u8;

/// Application message category, 0-255.
pub type Tag = u8;

/// The single tag reserved for remote-call traffic.
///
/// Shared between the messaging core (which routes it to the completion
/// thread) and the call codec; ordinary `send`/`recv` callers are
/// rejected when they ask for it.
pub const CALL_TAG: Tag = 100;

/// Kind of control unit a discovered module reports in its TXT record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleType {
    /// Central motion/behavior controller
    Controller,
    /// Drivetrain unit
    Drive,
    /// Sensor hub
    Sensor,
    /// Manipulator / arm unit
    Manipulator,
    /// Power management unit
    Power,
    /// Unrecognized type code, preserved as announced
    Unknown(u8),
}

impl From<u8> for ModuleType {
    fn from(value: u8) -> Self {
        match value {
            0 => ModuleType::Controller,
            1 => ModuleType::Drive,
            2 => ModuleType::Sensor,
            3 => ModuleType::Manipulator,
            4 => ModuleType::Power,
            other => ModuleType::Unknown(other),
        }
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleType::Controller => write!(f, "controller"),
            ModuleType::Drive => write!(f, "drive"),
            ModuleType::Sensor => write!(f, "sensor"),
            ModuleType::Manipulator => write!(f, "manipulator"),
            ModuleType::Power => write!(f, "power"),
            ModuleType::Unknown(code) => write!(f, "unknown({})", code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_type_mapping() {
        assert_eq!(ModuleType::from(0), ModuleType::Controller);
        assert_eq!(ModuleType::from(2), ModuleType::Sensor);
        assert_eq!(ModuleType::from(200), ModuleType::Unknown(200));
    }

    #[test]
    fn test_module_type_display() {
        assert_eq!(ModuleType::Drive.to_string(), "drive");
        assert_eq!(ModuleType::Unknown(9).to_string(), "unknown(9)");
    }
}
