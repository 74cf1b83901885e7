//! Output banks.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use log::warn;

use crate::arbiter::BusArbiter;
use crate::device::{BusAddress, DeviceId};
use crate::error::WriteError;
use crate::expander::pin::BankPin;
use crate::expander::Expander;
use crate::interface::BusInterface;
use crate::mutex::{BusMutex, DefaultMutex};
use crate::registers::valid_pin;

/// One bank of 16 outputs and the in-memory mirror of what was last written to it.
///
/// Writes are never dropped and never time out: each one waits for the bus as long as it takes
/// and then lands as a single 16-bit transfer. The mirror is updated inside that same critical
/// section, so concurrent single-pin writes to one bank cannot undo each other.
pub struct OutputBank<BI, M = DefaultMutex<BI>>
where
    BI: BusInterface,
    M: BusMutex<BI>,
{
    id: DeviceId,
    address: BusAddress,
    bits: AtomicU16,
    arbiter: Arc<BusArbiter<BI, M>>,
}

impl<BI, M> OutputBank<BI, M>
where
    BI: BusInterface,
    M: BusMutex<BI>,
{
    /// Wrap an already opened bank. Opening drives every output low, so the mirror starts there.
    pub(crate) fn new(id: DeviceId, address: BusAddress, arbiter: Arc<BusArbiter<BI, M>>) -> Self {
        Self {
            id,
            address,
            bits: AtomicU16::new(0),
            arbiter,
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn address(&self) -> BusAddress {
        self.address
    }

    /// The last value written (or attempted) to this bank. Bit `n` is pin `n`. This is the
    /// software mirror; the hardware is never read back.
    pub fn bits(&self) -> u16 {
        self.bits.load(Ordering::Acquire)
    }

    /// Drive all 16 pins to `bits`. Returns once the transfer is done.
    pub fn write_all(&self, bits: u16) {
        self.update(|_| bits)
    }

    /// Drive a single pin, leaving the others as they are in the mirror. Pins outside `0..16`
    /// are refused without touching the bus.
    pub fn write_pin(&self, pin: u8, value: bool) -> Result<(), WriteError> {
        let pin = valid_pin(pin).ok_or(WriteError::PinOutOfRange(pin))?;
        self.set_pin(pin, value);
        Ok(())
    }

    /// Create an `embedded-hal` output pin for `pin`, or `None` if the bank has no such pin.
    pub fn pin(&self, pin: u8) -> Option<BankPin<'_, BI, M>> {
        valid_pin(pin).map(|pin| BankPin::new(self, pin))
    }

    pub(crate) fn set_pin(&self, pin: u8, value: bool) {
        let mask = 1u16 << pin;
        self.update(|bits| if value { bits | mask } else { bits & !mask })
    }

    fn update(&self, f: impl Fn(u16) -> u16) {
        let address = self.address;
        let result = self.arbiter.with_lock(|bi| {
            let next = f(self.bits.load(Ordering::Acquire));
            self.bits.store(next, Ordering::Release);
            Expander::new(bi, address).write_outputs(next)
        });
        if let Err(e) = result {
            self.arbiter.record_fault();
            warn!(
                "write of {:#06x} to bank {:?} at {} failed: {:?}",
                self.bits(),
                self.id,
                address,
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::test_spy::TestSpyInterface;
    use crate::mutex::test_contended::ContendedMutex;
    use std::thread;
    use std::time::Duration;

    const ACQUIRE: Duration = Duration::from_millis(200);

    fn bank<M: BusMutex<TestSpyInterface>>(
        spy: &TestSpyInterface,
        id: DeviceId,
        a: u8,
    ) -> OutputBank<TestSpyInterface, M> {
        let arbiter = Arc::new(BusArbiter::new(spy.split(), ACQUIRE));
        OutputBank::new(id, BusAddress::new(a).unwrap(), arbiter)
    }

    #[test]
    fn write_all_pushes_and_mirrors() {
        let spy = TestSpyInterface::new();
        let a: OutputBank<_> = bank(&spy, DeviceId::A, 0x20);
        a.write_all(0xF00D);
        assert_eq!(a.bits(), 0xF00D);
        assert_eq!(spy.latch_writes(0x20), vec![0xF00D]);
        assert_eq!(spy.latch(0x20), 0xF00D);
    }

    #[test]
    fn write_pin_updates_one_bit() {
        let spy = TestSpyInterface::new();
        let c: OutputBank<_> = bank(&spy, DeviceId::C, 0x22);
        c.write_all(0x0F00);
        assert_eq!(c.write_pin(0, true), Ok(()));
        assert_eq!(c.write_pin(9, false), Ok(()));
        assert_eq!(c.write_pin(15, true), Ok(()));
        assert_eq!(c.bits(), 0x8D01);
        assert_eq!(spy.latch_writes(0x22), vec![0x0F00, 0x0F01, 0x0D01, 0x8D01]);
    }

    #[test]
    fn write_pin_out_of_range_is_refused() {
        let spy = TestSpyInterface::new();
        let d: OutputBank<_> = bank(&spy, DeviceId::D, 0x23);
        d.write_all(0x0001);
        spy.clear_log();
        assert_eq!(d.write_pin(16, true), Err(WriteError::PinOutOfRange(16)));
        assert_eq!(d.write_pin(200, false), Err(WriteError::PinOutOfRange(200)));
        assert_eq!(d.bits(), 0x0001);
        assert!(spy.log().is_empty());
        assert!(d.pin(16).is_none());
    }

    #[test]
    fn contended_write_lands_exactly_once() {
        let spy = TestSpyInterface::new();
        let e: OutputBank<_, ContendedMutex<_>> = bank(&spy, DeviceId::E, 0x24);
        e.arbiter.mutex().fail_next(3);
        e.write_all(0x1234);
        assert_eq!(spy.latch_writes(0x24), vec![0x1234]);
        assert_eq!(e.bits(), 0x1234);
        assert_eq!(e.arbiter.stats().contended, 3);
    }

    #[test]
    fn failed_transfer_keeps_attempted_value() {
        let spy = TestSpyInterface::new();
        spy.remove(0x25);
        let f: OutputBank<_> = bank(&spy, DeviceId::F, 0x25);
        f.write_all(0x00FF);
        assert_eq!(f.bits(), 0x00FF);
        assert_eq!(f.arbiter.stats().faults, 1);
    }

    #[test]
    fn two_banks_written_concurrently() {
        let spy = TestSpyInterface::new();
        spy.set_delay(Duration::from_millis(1));
        let arbiter: Arc<BusArbiter<_>> = Arc::new(BusArbiter::new(spy.split(), ACQUIRE));
        let a = Arc::new(OutputBank::new(
            DeviceId::A,
            BusAddress::new(0x20).unwrap(),
            arbiter.clone(),
        ));
        let b = Arc::new(OutputBank::new(
            DeviceId::B,
            BusAddress::new(0x21).unwrap(),
            arbiter.clone(),
        ));

        let writers = vec![(a.clone(), 0xAAAAu16), (b.clone(), 0x5555u16)]
            .into_iter()
            .map(|(bank, last)| {
                thread::spawn(move || {
                    for v in 0..20u16 {
                        bank.write_all(v);
                    }
                    bank.write_all(last);
                })
            })
            .collect::<Vec<_>>();
        for w in writers {
            w.join().unwrap();
        }

        assert_eq!(a.bits(), 0xAAAA);
        assert_eq!(b.bits(), 0x5555);
        assert_eq!(spy.latch(0x20), 0xAAAA);
        assert_eq!(spy.latch(0x21), 0x5555);
        assert_eq!(spy.latch_writes(0x20).len(), 21);
        assert_eq!(spy.latch_writes(0x21).len(), 21);
        assert_eq!(spy.max_in_flight(), 1);
    }

    #[test]
    fn concurrent_pin_writes_do_not_lose_bits() {
        let spy = TestSpyInterface::new();
        let g: Arc<OutputBank<_>> = Arc::new(bank(&spy, DeviceId::G, 0x26));

        let writers = (0..16u8)
            .map(|pin| {
                let g = g.clone();
                thread::spawn(move || g.write_pin(pin, true))
            })
            .collect::<Vec<_>>();
        for w in writers {
            assert_eq!(w.join().unwrap(), Ok(()));
        }

        assert_eq!(g.bits(), 0xFFFF);
        assert_eq!(spy.latch(0x26), 0xFFFF);
        assert_eq!(spy.latch_writes(0x26).len(), 16);
    }
}
