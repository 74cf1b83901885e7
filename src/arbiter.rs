//! Arbitration of the shared bus.
//!
//! Every transfer to every bank goes through the one `BusArbiter`, which owns the
//! `BusInterface` behind a [`BusMutex`]. A critical section covers exactly one transfer, so no
//! task holds the bus for longer than a single register access.

use core::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use log::trace;

use crate::interface::BusInterface;
use crate::mutex::{BusMutex, DefaultMutex};

/// Counters describing bus traffic since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    /// Critical sections entered. Each covers at most one transfer.
    pub transfers: u64,
    /// Acquisition attempts that timed out because another task held the bus.
    pub contended: u64,
    /// Transfers the device or bus rejected.
    pub faults: u64,
}

#[derive(Default)]
struct Counters {
    transfers: AtomicU64,
    contended: AtomicU64,
    faults: AtomicU64,
}

/// The single gate over the physical bus.
pub struct BusArbiter<BI, M = DefaultMutex<BI>>
where
    BI: BusInterface,
    M: BusMutex<BI>,
{
    bus: M,
    acquire_timeout: Duration,
    counters: Counters,
    // fn() -> BI keeps the arbiter Send + Sync whenever M is; the interface itself only ever
    // lives inside the mutex.
    _iface: PhantomData<fn() -> BI>,
}

impl<BI, M> BusArbiter<BI, M>
where
    BI: BusInterface,
    M: BusMutex<BI>,
{
    /// Take ownership of `iface`. `acquire_timeout` bounds each attempt made by
    /// [`with_lock`](Self::with_lock).
    pub fn new(iface: BI, acquire_timeout: Duration) -> Self {
        Self {
            bus: M::new(iface),
            acquire_timeout,
            counters: Counters::default(),
            _iface: PhantomData,
        }
    }

    pub fn acquire_timeout(&self) -> Duration {
        self.acquire_timeout
    }

    /// Make one attempt to take the bus, waiting at most `timeout`. If the bus is obtained, run
    /// the single transfer `op` and release the bus; otherwise return `None` without running it.
    pub fn acquire<R, F>(&self, timeout: Duration, op: F) -> Option<R>
    where
        F: FnOnce(&mut BI) -> R,
    {
        let result = self.bus.try_lock_for(timeout, |iface| {
            self.counters.transfers.fetch_add(1, Ordering::Relaxed);
            op(iface)
        });
        if result.is_none() {
            self.counters.contended.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Run the single transfer `op` with the bus held, however long that takes.
    ///
    /// Each attempt waits up to the acquire timeout; between attempts the calling thread yields
    /// to the scheduler so that watchdogs and other tasks keep running. This never gives up, so
    /// a write that has been asked for always lands, exactly once.
    pub fn with_lock<R, F>(&self, mut op: F) -> R
    where
        F: FnMut(&mut BI) -> R,
    {
        let mut attempts = 1u32;
        loop {
            if let Some(r) = self.acquire(self.acquire_timeout, |iface| op(iface)) {
                return r;
            }
            trace!(
                "bus busy for {:?} (attempt {}), yielding",
                self.acquire_timeout,
                attempts
            );
            attempts = attempts.saturating_add(1);
            self.bus.relax();
        }
    }

    /// Count a transfer that reached the bus but failed.
    pub(crate) fn record_fault(&self) {
        self.counters.faults.fetch_add(1, Ordering::Relaxed);
    }

    /// A snapshot of the traffic counters.
    pub fn stats(&self) -> BusStats {
        BusStats {
            transfers: self.counters.transfers.load(Ordering::Relaxed),
            contended: self.counters.contended.load(Ordering::Relaxed),
            faults: self.counters.faults.load(Ordering::Relaxed),
        }
    }

    #[cfg(test)]
    pub(crate) fn mutex(&self) -> &M {
        &self.bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::BusAddress;
    use crate::interface::test_spy::{TestSpyInterface, Transfer};
    use crate::mutex::test_contended::ContendedMutex;
    use crate::registers::{Port, Register};
    use std::sync::Arc;
    use std::thread;

    fn dev(a: u8) -> BusAddress {
        BusAddress::new(a).unwrap()
    }

    fn write(iface: &mut TestSpyInterface, device: u8, value: u16) {
        iface
            .write_register_pair(dev(device), Register::Latch(Port::A).into(), value)
            .unwrap()
    }

    #[test]
    fn acquire_runs_one_transfer() {
        let spy = TestSpyInterface::new();
        let arbiter: BusArbiter<_> = BusArbiter::new(spy.split(), ACQUIRE);
        assert_eq!(
            arbiter.acquire(Duration::from_millis(10), |bi| write(bi, 0x20, 0x00FF)),
            Some(())
        );
        assert_eq!(spy.latch_writes(0x20), vec![0x00FF]);
        assert_eq!(
            arbiter.stats(),
            BusStats {
                transfers: 1,
                contended: 0,
                faults: 0
            }
        );
    }

    const ACQUIRE: Duration = Duration::from_millis(200);

    #[test]
    fn acquire_gives_up_when_contended() {
        let spy = TestSpyInterface::new();
        let arbiter: BusArbiter<_, ContendedMutex<_>> = BusArbiter::new(spy.split(), ACQUIRE);
        arbiter.mutex().fail_next(1);
        assert_eq!(
            arbiter.acquire(Duration::from_millis(10), |bi| write(bi, 0x20, 1)),
            None
        );
        assert!(spy.log().is_empty());
        assert_eq!(arbiter.stats().contended, 1);
        assert_eq!(arbiter.stats().transfers, 0);
    }

    #[test]
    fn with_lock_retries_until_it_lands_once() {
        let spy = TestSpyInterface::new();
        let arbiter: BusArbiter<_, ContendedMutex<_>> = BusArbiter::new(spy.split(), ACQUIRE);
        arbiter.mutex().fail_next(5);

        arbiter.with_lock(|bi| write(bi, 0x22, 0xA5A5));

        assert_eq!(spy.latch_writes(0x22), vec![0xA5A5]);
        assert_eq!(arbiter.mutex().attempts(), 6);
        assert_eq!(arbiter.mutex().relaxed(), 5);
        assert_eq!(
            arbiter.stats(),
            BusStats {
                transfers: 1,
                contended: 5,
                faults: 0
            }
        );
    }

    #[test]
    fn with_lock_returns_operation_result() {
        let spy = TestSpyInterface::new();
        spy.set_inputs(0x27, 0x8001);
        let arbiter: BusArbiter<_> = BusArbiter::new(spy.split(), ACQUIRE);
        let got = arbiter.with_lock(|bi| bi.read_register(dev(0x27), Register::Gpio(Port::B).into()));
        assert_eq!(got, Ok(0x80));
    }

    #[test]
    fn transfers_never_overlap() {
        let spy = TestSpyInterface::new();
        spy.set_delay(Duration::from_millis(1));
        let arbiter: Arc<BusArbiter<_>> = Arc::new(BusArbiter::new(spy.split(), ACQUIRE));

        let workers = (0..6u8)
            .map(|n| {
                let arbiter = arbiter.clone();
                thread::spawn(move || {
                    for i in 0..10u16 {
                        if n % 2 == 0 {
                            arbiter.with_lock(|bi| write(bi, 0x20 + n, i));
                        } else {
                            let _ = arbiter.acquire(Duration::from_millis(5), |bi| {
                                bi.read_register(dev(0x27), Register::Gpio(Port::A).into())
                            });
                        }
                    }
                })
            })
            .collect::<Vec<_>>();
        for w in workers {
            w.join().unwrap();
        }

        assert_eq!(spy.max_in_flight(), 1);
        for n in (0..6u8).step_by(2) {
            assert_eq!(spy.latch_writes(0x20 + n), (0..10).collect::<Vec<_>>());
        }
        let writes = spy
            .log()
            .into_iter()
            .filter(|t| matches!(t, Transfer::Write { .. }))
            .count();
        assert_eq!(writes, 30);
    }
}
