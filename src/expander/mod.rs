//! The expander device API. `Expander` is a direct abstraction of one MCP23X17 on the shared
//! bus, borrowed from inside a critical section. The bank types built on it live in the
//! submodules: [`OutputBank`](output::OutputBank) for the output banks and
//! [`ReadCache`](input::ReadCache) for the input bank.

use log::{debug, error};

use crate::arbiter::BusArbiter;
use crate::device::{BusAddress, DeviceSpec, Direction};
use crate::error::InitError;
use crate::interface::BusInterface;
use crate::mutex::BusMutex;
use crate::registers::{Port, Register};

pub mod input;
pub mod output;
pub mod pin;

/// One port expander, for the duration of a single critical section. Every method is exactly
/// one bus transaction.
pub(crate) struct Expander<'i, BI: BusInterface> {
    iface: &'i mut BI,
    address: BusAddress,
}

impl<'i, BI: BusInterface> Expander<'i, BI> {
    pub(crate) fn new(iface: &'i mut BI, address: BusAddress) -> Self {
        Self { iface, address }
    }

    /// Put the chip in sequential, paired-register mode (`IOCON.BANK = 0`, `SEQOP = 0`).
    pub(crate) fn write_config(&mut self) -> Result<(), BI::Error> {
        self.iface
            .write_register_pair(self.address, Register::Configuration.into(), 0x0000)
    }

    /// Set the direction of all 16 pins. A set bit makes the pin an input.
    pub(crate) fn write_direction(&mut self, inputs: u16) -> Result<(), BI::Error> {
        self.iface
            .write_register_pair(self.address, Register::Direction(Port::A).into(), inputs)
    }

    pub(crate) fn read_direction(&mut self) -> Result<u16, BI::Error> {
        self.iface
            .read_register_pair(self.address, Register::Direction(Port::A).into())
    }

    pub(crate) fn write_pullups(&mut self, mask: u16) -> Result<(), BI::Error> {
        self.iface
            .write_register_pair(self.address, Register::Pullup(Port::A).into(), mask)
    }

    /// Drive all 16 output latches at once. Bit `n` is pin `n`.
    pub(crate) fn write_outputs(&mut self, bits: u16) -> Result<(), BI::Error> {
        self.iface
            .write_register_pair(self.address, Register::Latch(Port::A).into(), bits)
    }

    /// Sample the level of one pin. `pin` must already be validated.
    pub(crate) fn read_pin(&mut self, pin: u8) -> Result<bool, BI::Error> {
        let (port, bit) = Port::of_pin(pin);
        self.iface
            .read_register(self.address, Register::Gpio(port).into())
            .map(|v| v & (1 << bit) != 0)
    }
}

/// Bring up one bank: configure the chip, set pin directions and confirm the chip took them,
/// then set pull-ups (input bank) or drive every output low (output banks).
///
/// Each step is its own critical section. Any failure is fatal to initialization.
pub(crate) fn open<BI, M>(
    arbiter: &BusArbiter<BI, M>,
    spec: DeviceSpec,
    pullups: u16,
) -> Result<(), InitError<BI::Error>>
where
    BI: BusInterface,
    M: BusMutex<BI>,
{
    let DeviceSpec { id, address } = spec;
    let fail = |cause: BI::Error| {
        error!("bank {:?} at {} failed to initialize: {:?}", id, address, cause);
        InitError::Handshake { id, address, cause }
    };

    let direction = match id.direction() {
        Direction::Output => 0x0000,
        Direction::Input => 0xFFFF,
    };

    arbiter
        .with_lock(|bi| Expander::new(bi, address).write_config())
        .map_err(fail)?;
    arbiter
        .with_lock(|bi| Expander::new(bi, address).write_direction(direction))
        .map_err(fail)?;
    let found = arbiter
        .with_lock(|bi| Expander::new(bi, address).read_direction())
        .map_err(fail)?;
    if found != direction {
        error!(
            "bank {:?} at {} read back direction {:#06x}, expected {:#06x}",
            id, address, found, direction
        );
        return Err(InitError::HandshakeMismatch {
            id,
            address,
            expected: direction,
            found,
        });
    }

    match id.direction() {
        Direction::Input => arbiter
            .with_lock(|bi| Expander::new(bi, address).write_pullups(pullups))
            .map_err(fail)?,
        Direction::Output => arbiter
            .with_lock(|bi| Expander::new(bi, address).write_outputs(0x0000))
            .map_err(fail)?,
    }

    debug!("bank {:?} at {} ready as {:?}", id, address, id.direction());
    Ok(())
}
