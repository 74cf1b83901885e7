//! The register addresses within the MCP23X17.
//!
//! The driver always operates the chip with `IOCON.BANK = 0`, where the A and B halves of each
//! 16-bit register sit at consecutive addresses and the address pointer auto-increments. This
//! lets a whole 16-pin bank be written in a single bus transaction starting at the A register.

/// A register address within the MCP23X17. These are created by conversion from `Register`. It
/// is a newtype around `u8` that prevents invalid addresses from being forged and passed to
/// `BusInterface` methods.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct RegisterAddress(pub(crate) u8);

impl From<RegisterAddress> for u8 {
    /// Convert a `RegisterAddress` into a `u8` corresponding to the hardware address.
    fn from(addr: RegisterAddress) -> u8 {
        addr.0
    }
}

/// Number of GPIO pins on one expander.
pub const PIN_COUNT: u8 = 16;

/// One of the two 8-bit GPIO ports of the expander. Pins 0-7 are on port A, pins 8-15 on B.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Port {
    A,
    B,
}

impl Port {
    /// The port holding `pin`, and the bit position of the pin within that port.
    pub(crate) fn of_pin(pin: u8) -> (Port, u8) {
        if pin < 8 {
            (Port::A, pin)
        } else {
            (Port::B, pin - 8)
        }
    }

    fn offset(self) -> u8 {
        match self {
            Port::A => 0,
            Port::B => 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Register {
    /// Pin direction register. A set bit makes the pin an input. Resets to all inputs.
    Direction(Port),

    /// Weak pull-up enable register. A set bit enables the ~100k pull-up on an input pin.
    Pullup(Port),

    /// Device configuration register. Both addresses access the same register.
    Configuration,

    /// Port register. Reading returns the logic level at the pins.
    Gpio(Port),

    /// Output latch register. Writing drives the output pins.
    Latch(Port),
}

/// Returns `Some(pin)` if `pin` exists on the expander.
pub(crate) fn valid_pin(pin: u8) -> Option<u8> {
    if pin < PIN_COUNT {
        Some(pin)
    } else {
        None
    }
}

impl From<Register> for RegisterAddress {
    /// Convert a `Register` into a `RegisterAddress`.
    fn from(reg: Register) -> RegisterAddress {
        use self::Register::*;
        match reg {
            Direction(port) => RegisterAddress(0x00 + port.offset()),
            Pullup(port) => RegisterAddress(0x0C + port.offset()),
            Configuration => RegisterAddress(0x0A),
            Gpio(port) => RegisterAddress(0x12 + port.offset()),
            Latch(port) => RegisterAddress(0x14 + port.offset()),
        }
    }
}
