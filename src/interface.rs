//! This module provides shims between `embedded-hal` bus implementations and the expanders'
//! registers. Every expander on the bus is reached through one `BusInterface`, so the interface
//! itself is the shared resource that the arbiter guards.

use core::fmt;

use crate::device::BusAddress;
use crate::registers::RegisterAddress;

/// A bus connecting one or more MCP23X17s implements this trait, which provides the basic
/// operations for sending pre-encoded register accesses to the chip at a given address.
///
/// Each method is exactly one bus transaction.
pub trait BusInterface {
    /// The type of error that register reads and writes may return.
    type Error: fmt::Debug;

    /// Write the 16-bit `value` into the register pair starting at `addr` on `device`. The low
    /// byte lands in the port A register, the high byte in port B.
    fn write_register_pair(
        &mut self,
        device: BusAddress,
        addr: RegisterAddress,
        value: u16,
    ) -> Result<(), Self::Error>;

    /// Read the 16-bit register pair starting at `addr` on `device`, port A in the low byte.
    fn read_register_pair(
        &mut self,
        device: BusAddress,
        addr: RegisterAddress,
    ) -> Result<u16, Self::Error>;

    /// Read the single 8-bit register at `addr` on `device`.
    fn read_register(&mut self, device: BusAddress, addr: RegisterAddress)
        -> Result<u8, Self::Error>;
}

// This is here (and has to be pub) for doctests only. It's useless otherwise.
#[doc(hidden)]
pub mod noop {
    use super::BusInterface;
    use crate::device::BusAddress;
    use crate::registers::RegisterAddress;

    /// Accepts every write and reads back whatever was last written to a register pair.
    #[derive(Default)]
    pub struct NoopInterface {
        pairs: Vec<(BusAddress, RegisterAddress, u16)>,
    }

    impl BusInterface for NoopInterface {
        type Error = core::convert::Infallible;

        fn write_register_pair(
            &mut self,
            device: BusAddress,
            addr: RegisterAddress,
            value: u16,
        ) -> Result<(), Self::Error> {
            self.pairs.retain(|&(d, a, _)| d != device || a != addr);
            self.pairs.push((device, addr, value));
            Ok(())
        }

        fn read_register_pair(
            &mut self,
            device: BusAddress,
            addr: RegisterAddress,
        ) -> Result<u16, Self::Error> {
            Ok(self
                .pairs
                .iter()
                .find(|&&(d, a, _)| d == device && a == addr)
                .map_or(0, |&(_, _, v)| v))
        }

        fn read_register(
            &mut self,
            _device: BusAddress,
            _addr: RegisterAddress,
        ) -> Result<u8, Self::Error> {
            Ok(0)
        }
    }
}

pub mod i2c {
    //! The I2C interface reaches every MCP23X17 through one two-wire bus (SCL, SDA).

    use core::fmt;

    use hal::blocking::i2c::{Write, WriteRead};

    use super::BusInterface;
    use crate::device::BusAddress;
    use crate::registers::RegisterAddress;

    /// The union of the errors the I2C master may return for the two kinds of transaction.
    #[derive(Debug)]
    pub enum I2cInterfaceError<WE, RE> {
        /// An error occurred during an I2C write.
        WriteError(WE),
        /// An error occurred during an I2C write-then-read.
        ReadError(RE),
    }

    /// A configured `BusInterface` for MCP23X17s on an I2C bus.
    pub struct I2cInterface<I2C> {
        i2c: I2C,
    }

    impl<I2C> I2cInterface<I2C>
    where
        I2C: Write + WriteRead,
    {
        /// Create a new interface owning the I2C master device `i2c`.
        pub fn new(i2c: I2C) -> Self {
            Self { i2c }
        }

        /// Release the I2C master device.
        pub fn release(self) -> I2C {
            self.i2c
        }
    }

    impl<I2C> BusInterface for I2cInterface<I2C>
    where
        I2C: Write + WriteRead,
        <I2C as Write>::Error: fmt::Debug,
        <I2C as WriteRead>::Error: fmt::Debug,
    {
        type Error = I2cInterfaceError<<I2C as Write>::Error, <I2C as WriteRead>::Error>;

        fn write_register_pair(
            &mut self,
            device: BusAddress,
            addr: RegisterAddress,
            value: u16,
        ) -> Result<(), Self::Error> {
            // Register pointer first, then A and B; the chip auto-increments between them.
            let [lo, hi] = value.to_le_bytes();
            self.i2c
                .write(device.into(), &[addr.into(), lo, hi])
                .map_err(I2cInterfaceError::WriteError)
        }

        fn read_register_pair(
            &mut self,
            device: BusAddress,
            addr: RegisterAddress,
        ) -> Result<u16, Self::Error> {
            let mut buf = [0u8; 2];
            self.i2c
                .write_read(device.into(), &[addr.into()], &mut buf)
                .map_err(I2cInterfaceError::ReadError)?;
            Ok(u16::from_le_bytes(buf))
        }

        fn read_register(
            &mut self,
            device: BusAddress,
            addr: RegisterAddress,
        ) -> Result<u8, Self::Error> {
            let mut buf = [0u8; 1];
            self.i2c
                .write_read(device.into(), &[addr.into()], &mut buf)
                .map_err(I2cInterfaceError::ReadError)?;
            Ok(buf[0])
        }
    }

}
