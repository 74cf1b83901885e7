//! APIs for using single expander pins through `embedded-hal`.

use core::convert::Infallible;

#[cfg(feature = "unproven")]
use hal::digital::v2::{InputPin, StatefulOutputPin};
use hal::digital::v2::OutputPin;

use crate::clock::Clock;
use crate::expander::input::ReadCache;
use crate::expander::output::OutputBank;
use crate::interface::BusInterface;
use crate::mutex::BusMutex;

/// A single pin of an output bank. These implement the `embedded-hal` output traits, so drivers
/// written against GPIO pins can drive expander outputs without modification.
///
/// Every level change is an immediate, arbitrated 16-bit write of the bank.
pub struct BankPin<'b, BI, M>
where
    BI: BusInterface,
    M: BusMutex<BI>,
{
    bank: &'b OutputBank<BI, M>,
    pin: u8,
}

impl<'b, BI, M> BankPin<'b, BI, M>
where
    BI: BusInterface,
    M: BusMutex<BI>,
{
    pub(crate) fn new(bank: &'b OutputBank<BI, M>, pin: u8) -> Self {
        Self { bank, pin }
    }

    pub fn pin(&self) -> u8 {
        self.pin
    }
}

impl<'b, BI, M> OutputPin for BankPin<'b, BI, M>
where
    BI: BusInterface,
    M: BusMutex<BI>,
{
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Infallible> {
        self.bank.set_pin(self.pin, false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.bank.set_pin(self.pin, true);
        Ok(())
    }
}

// Answered from the mirror; the hardware is not read back.
#[cfg(feature = "unproven")]
impl<'b, BI, M> StatefulOutputPin for BankPin<'b, BI, M>
where
    BI: BusInterface,
    M: BusMutex<BI>,
{
    fn is_set_high(&self) -> Result<bool, Infallible> {
        Ok(self.bank.bits() & (1 << self.pin) != 0)
    }

    fn is_set_low(&self) -> Result<bool, Infallible> {
        self.is_set_high().map(|high| !high)
    }
}

/// A single pin of the input bank, read through the cache.
pub struct CachedPin<'c, BI, M, C>
where
    BI: BusInterface,
    M: BusMutex<BI>,
    C: Clock,
{
    cache: &'c ReadCache<BI, M, C>,
    pin: u8,
}

impl<'c, BI, M, C> CachedPin<'c, BI, M, C>
where
    BI: BusInterface,
    M: BusMutex<BI>,
    C: Clock,
{
    pub(crate) fn new(cache: &'c ReadCache<BI, M, C>, pin: u8) -> Self {
        Self { cache, pin }
    }

    pub fn pin(&self) -> u8 {
        self.pin
    }
}

#[cfg(feature = "unproven")]
impl<'c, BI, M, C> InputPin for CachedPin<'c, BI, M, C>
where
    BI: BusInterface,
    M: BusMutex<BI>,
    C: Clock,
{
    type Error = Infallible;

    fn is_high(&self) -> Result<bool, Infallible> {
        Ok(self.cache.read(self.pin))
    }

    fn is_low(&self) -> Result<bool, Infallible> {
        self.is_high().map(|high| !high)
    }
}
