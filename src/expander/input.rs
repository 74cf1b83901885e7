//! The cached input bank.
//!
//! Buttons are polled far more often than they change, so each pin of the input bank keeps its
//! last sampled level together with the time it was sampled. A read within the TTL of that
//! sample is answered from memory without touching the bus or any lock. A read after the TTL
//! makes one bounded attempt at the bus; if the bus stays busy, the stale level is served rather
//! than holding up the polling task.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{info, trace, warn};

use crate::arbiter::BusArbiter;
use crate::clock::{Clock, MonotonicClock};
use crate::device::BusAddress;
use crate::expander::pin::CachedPin;
use crate::expander::Expander;
use crate::interface::BusInterface;
use crate::mutex::{BusMutex, DefaultMutex};
use crate::registers::{valid_pin, PIN_COUNT};

/// Snapshot of one pin's cache state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheEntry {
    pub value: bool,
    /// Clock reading (ms) of the last successful refresh.
    pub timestamp: u64,
    pub polls: u32,
    pub hits: u32,
    pub misses: u32,
}

/// Poll counters of one pin over a reporting interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PinStats {
    pub polls: u32,
    pub hits: u32,
    pub misses: u32,
}

/// Per-pin poll counters collected since the previous report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollReport {
    /// Clock reading (ms) when the counters were collected.
    pub at_ms: u64,
    pub pins: [PinStats; PIN_COUNT as usize],
}

impl PollReport {
    /// The pins that were polled at least once, with their counters.
    pub fn active(&self) -> impl Iterator<Item = (u8, PinStats)> + '_ {
        self.pins
            .iter()
            .enumerate()
            .filter(|(_, s)| s.polls > 0)
            .map(|(pin, s)| (pin as u8, *s))
    }
}

/// Receives every periodic [`PollReport`].
pub type ReportObserver = Box<dyn Fn(&PollReport) + Send + Sync>;

#[derive(Default)]
struct PinSlot {
    value: AtomicBool,
    refreshed: AtomicBool,
    timestamp: AtomicU64,
    polls: AtomicU32,
    hits: AtomicU32,
    misses: AtomicU32,
}

/// Read cache in front of the input bank.
pub struct ReadCache<BI, M = DefaultMutex<BI>, C = MonotonicClock>
where
    BI: BusInterface,
    M: BusMutex<BI>,
    C: Clock,
{
    address: BusAddress,
    arbiter: Arc<BusArbiter<BI, M>>,
    clock: C,
    ttl_ms: u64,
    read_timeout: Duration,
    report_interval_ms: Option<u64>,
    last_report: AtomicU64,
    slots: [PinSlot; PIN_COUNT as usize],
    observer: Option<ReportObserver>,
}

impl<BI, M, C> ReadCache<BI, M, C>
where
    BI: BusInterface,
    M: BusMutex<BI>,
    C: Clock,
{
    /// Every pin starts out as `false`, sampled at time zero, with zeroed counters.
    pub(crate) fn new(
        address: BusAddress,
        arbiter: Arc<BusArbiter<BI, M>>,
        clock: C,
        ttl: Duration,
        read_timeout: Duration,
        report_interval: Option<Duration>,
    ) -> Self {
        Self {
            address,
            arbiter,
            clock,
            ttl_ms: ttl.as_millis() as u64,
            read_timeout,
            report_interval_ms: report_interval.map(|i| i.as_millis() as u64),
            last_report: AtomicU64::new(0),
            slots: Default::default(),
            observer: None,
        }
    }

    pub fn address(&self) -> BusAddress {
        self.address
    }

    /// Read the level of input `pin`.
    ///
    /// Pins outside `0..16` read as `false` and leave the cache untouched. A pin that has never
    /// been sampled successfully also reads as `false`; use
    /// [`read_checked`](Self::read_checked) to tell the two apart.
    pub fn read(&self, pin: u8) -> bool {
        self.poll(pin)
            .map_or(false, |slot| slot.value.load(Ordering::Acquire))
    }

    /// Like [`read`](Self::read), but returns `None` for a pin that is out of range or whose
    /// level has never been sampled successfully.
    pub fn read_checked(&self, pin: u8) -> Option<bool> {
        let slot = self.poll(pin)?;
        if slot.refreshed.load(Ordering::Acquire) {
            Some(slot.value.load(Ordering::Acquire))
        } else {
            None
        }
    }

    /// Create an `embedded-hal` input pin for `pin`, or `None` if the bank has no such pin.
    pub fn pin(&self, pin: u8) -> Option<CachedPin<'_, BI, M, C>> {
        valid_pin(pin).map(|pin| CachedPin::new(self, pin))
    }

    /// Inspect the cache state of `pin` without polling it.
    pub fn entry(&self, pin: u8) -> Option<CacheEntry> {
        let slot = &self.slots[valid_pin(pin)? as usize];
        Some(CacheEntry {
            value: slot.value.load(Ordering::Acquire),
            timestamp: slot.timestamp.load(Ordering::Acquire),
            polls: slot.polls.load(Ordering::Relaxed),
            hits: slot.hits.load(Ordering::Relaxed),
            misses: slot.misses.load(Ordering::Relaxed),
        })
    }

    /// Have every periodic report handed to `observer` as well as logged.
    pub fn set_observer<F>(&mut self, observer: F)
    where
        F: Fn(&PollReport) + Send + Sync + 'static,
    {
        self.observer = Some(Box::new(observer));
    }

    /// Collect and reset the poll counters of every pin. Cached levels are kept.
    pub fn take_report(&self) -> PollReport {
        self.collect(self.clock.now_ms())
    }

    fn poll(&self, pin: u8) -> Option<&PinSlot> {
        let pin = valid_pin(pin)?;
        let slot = &self.slots[pin as usize];
        slot.polls.fetch_add(1, Ordering::Relaxed);

        let now = self.clock.now_ms();
        if now.saturating_sub(slot.timestamp.load(Ordering::Acquire)) >= self.ttl_ms {
            slot.misses.fetch_add(1, Ordering::Relaxed);
            self.refresh(pin, slot, now);
        } else {
            slot.hits.fetch_add(1, Ordering::Relaxed);
        }

        self.maybe_report(now);
        Some(slot)
    }

    fn refresh(&self, pin: u8, slot: &PinSlot, now: u64) {
        let address = self.address;
        let ttl_ms = self.ttl_ms;
        let outcome = self.arbiter.acquire(self.read_timeout, |bi| -> Result<(), BI::Error> {
            // Someone else may have refreshed the pin while we waited for the bus.
            if now.saturating_sub(slot.timestamp.load(Ordering::Acquire)) < ttl_ms {
                return Ok(());
            }
            let level = Expander::new(bi, address).read_pin(pin)?;
            slot.value.store(level, Ordering::Release);
            slot.refreshed.store(true, Ordering::Release);
            slot.timestamp.store(now, Ordering::Release);
            Ok(())
        });
        match outcome {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                self.arbiter.record_fault();
                warn!("read of input pin {} at {} failed: {:?}", pin, address, e);
            }
            None => trace!(
                "bus busy for {:?}, serving cached level of input pin {}",
                self.read_timeout,
                pin
            ),
        }
    }

    fn maybe_report(&self, now: u64) {
        let interval = match self.report_interval_ms {
            Some(interval) => interval,
            None => return,
        };
        let last = self.last_report.load(Ordering::Acquire);
        if now.saturating_sub(last) < interval {
            return;
        }
        // Only the poller that moves the mark reports.
        if self
            .last_report
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let report = self.collect(now);
        info!("polling report:");
        for (pin, stats) in report.active() {
            info!(
                "pin {}: hits = {}, misses = {} (total polls: {})",
                pin, stats.hits, stats.misses, stats.polls
            );
        }
        if let Some(observer) = &self.observer {
            observer(&report);
        }
    }

    fn collect(&self, now: u64) -> PollReport {
        let mut pins = [PinStats::default(); PIN_COUNT as usize];
        for (slot, stats) in self.slots.iter().zip(pins.iter_mut()) {
            *stats = PinStats {
                polls: slot.polls.swap(0, Ordering::Relaxed),
                hits: slot.hits.swap(0, Ordering::Relaxed),
                misses: slot.misses.swap(0, Ordering::Relaxed),
            };
        }
        PollReport { at_ms: now, pins }
    }
}
