//! Error types.
//!
//! Only configuration and initialization failures are reported as fatal. Contention on the bus
//! is never an error: writes retry until they land, and cached reads fall back to the last known
//! value.

use thiserror::Error;

use crate::device::{BusAddress, DeviceId};

/// The bank table or timing parameters handed to the builder are unusable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("bank {0:?} is listed more than once")]
    DuplicateDevice(DeviceId),

    #[error("banks {first:?} and {second:?} are both assigned bus address {address}")]
    DuplicateAddress {
        address: BusAddress,
        first: DeviceId,
        second: DeviceId,
    },

    #[error("{0:#04x} is not an MCP23X17 bus address")]
    InvalidAddress(u8),

    #[error("{0} must be longer than zero")]
    ZeroDuration(&'static str),
}

/// Bringing up the bus failed. Running with a bank missing is not allowed, so callers should
/// treat every variant as fatal.
#[derive(Debug, Error)]
pub enum InitError<E> {
    #[error("invalid bus configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("bank {id:?} at {address} did not answer its startup handshake: {cause:?}")]
    Handshake {
        id: DeviceId,
        address: BusAddress,
        cause: E,
    },

    #[error("bank {id:?} at {address} read back direction {found:#06x}, expected {expected:#06x}")]
    HandshakeMismatch {
        id: DeviceId,
        address: BusAddress,
        expected: u16,
        found: u16,
    },
}

/// A write was refused before anything was sent on the bus.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum WriteError {
    #[error("no bank has index {0}")]
    UnknownDevice(u8),

    #[error("bank {0:?} is not fitted")]
    NotConfigured(DeviceId),

    #[error("bank {0:?} is an input bank")]
    NotAnOutput(DeviceId),

    #[error("pin {0} is out of range")]
    PinOutOfRange(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_bank() {
        let address = BusAddress::new(0x23).unwrap();
        let err: InitError<()> = InitError::HandshakeMismatch {
            id: DeviceId::D,
            address,
            expected: 0x0000,
            found: 0xffff,
        };
        assert_eq!(
            err.to_string(),
            "bank D at 0x23 read back direction 0xffff, expected 0x0000"
        );
        assert_eq!(
            WriteError::NotAnOutput(DeviceId::H).to_string(),
            "bank H is an input bank"
        );
    }

    #[test]
    fn config_errors_convert() {
        let err: InitError<()> = ConfigError::ZeroDuration("cache TTL").into();
        assert_eq!(
            err.to_string(),
            "invalid bus configuration: cache TTL must be longer than zero"
        );
    }
}
