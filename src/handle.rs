//! The single owner of everything on the expander bus.

use std::sync::Arc;

use log::info;

use crate::arbiter::{BusArbiter, BusStats};
use crate::clock::{Clock, MonotonicClock};
use crate::config::BusConfig;
use crate::device::{DeviceId, DeviceSpec, Direction};
use crate::error::{InitError, WriteError};
use crate::expander::input::ReadCache;
use crate::expander::output::OutputBank;
use crate::expander::open;
use crate::interface::BusInterface;
use crate::mutex::{BusMutex, DefaultMutex};

/// The initialized bus: the arbiter, one [`OutputBank`] per fitted output bank and the
/// [`ReadCache`] in front of the input bank.
///
/// Share it between tasks with an `Arc`; every operation takes `&self`.
pub struct BusHandle<BI, M = DefaultMutex<BI>, C = MonotonicClock>
where
    BI: BusInterface,
    M: BusMutex<BI>,
    C: Clock,
{
    arbiter: Arc<BusArbiter<BI, M>>,
    outputs: Vec<OutputBank<BI, M>>,
    input: Option<ReadCache<BI, M, C>>,
}

/// Bring up the bus described by `config` with the default mutex and the monotonic clock.
pub fn initialize_bus<BI>(iface: BI, config: &BusConfig) -> Result<BusHandle<BI>, InitError<BI::Error>>
where
    BI: BusInterface,
{
    BusHandle::initialize(iface, config, MonotonicClock::new())
}

impl<BI, M, C> BusHandle<BI, M, C>
where
    BI: BusInterface,
    M: BusMutex<BI>,
    C: Clock,
{
    /// Take ownership of `iface` and open every bank in `config`, in bank order.
    ///
    /// The first bank that fails its handshake aborts initialization and the error is returned;
    /// nothing built so far is kept. Output banks start with every pin low.
    pub fn initialize(iface: BI, config: &BusConfig, clock: C) -> Result<Self, InitError<BI::Error>> {
        let arbiter = Arc::new(BusArbiter::new(iface, config.acquire_timeout()));

        let mut outputs = Vec::new();
        for spec in config.registry().iter() {
            open(&arbiter, spec, config.input_pullups())?;
            let DeviceSpec { id, address } = spec;
            if id.direction() == Direction::Output {
                outputs.push(OutputBank::new(id, address, arbiter.clone()));
            }
        }

        let input = config.registry().address(DeviceId::H).map(|address| {
            ReadCache::new(
                address,
                arbiter.clone(),
                clock,
                config.cache_ttl(),
                config.read_timeout(),
                config.report_interval(),
            )
        });

        info!(
            "expander bus ready: {} output bank(s), input bank {}",
            outputs.len(),
            if input.is_some() { "fitted" } else { "absent" }
        );
        Ok(Self {
            arbiter,
            outputs,
            input,
        })
    }

    /// The output bank `id`, if it is fitted.
    pub fn output(&self, id: DeviceId) -> Option<&OutputBank<BI, M>> {
        self.outputs.iter().find(|bank| bank.id() == id)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &OutputBank<BI, M>> {
        self.outputs.iter()
    }

    /// The input bank's read cache, if the input bank is fitted.
    pub fn input(&self) -> Option<&ReadCache<BI, M, C>> {
        self.input.as_ref()
    }

    /// Mutable access to the read cache, for installing a report observer before the handle is
    /// shared.
    pub fn input_mut(&mut self) -> Option<&mut ReadCache<BI, M, C>> {
        self.input.as_mut()
    }

    /// Drive one pin of the output bank with numeric index `index` (`0` is bank `A`).
    ///
    /// Nothing is sent unless the index names a fitted output bank and the pin exists.
    pub fn write_pin_on_device(&self, index: u8, pin: u8, value: bool) -> Result<(), WriteError> {
        self.output_at(index)?.write_pin(pin, value)
    }

    /// Drive all 16 pins of the output bank with numeric index `index`.
    pub fn write_all_on_device(&self, index: u8, bits: u16) -> Result<(), WriteError> {
        self.output_at(index)?.write_all(bits);
        Ok(())
    }

    /// Drive every pin of every output bank low.
    pub fn reset_outputs(&self) {
        for bank in &self.outputs {
            bank.write_all(0x0000);
        }
    }

    pub fn arbiter(&self) -> &BusArbiter<BI, M> {
        &self.arbiter
    }

    pub fn stats(&self) -> BusStats {
        self.arbiter.stats()
    }

    fn output_at(&self, index: u8) -> Result<&OutputBank<BI, M>, WriteError> {
        let id = DeviceId::from_index(index).ok_or(WriteError::UnknownDevice(index))?;
        if id.direction() == Direction::Input {
            return Err(WriteError::NotAnOutput(id));
        }
        self.output(id).ok_or(WriteError::NotConfigured(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::interface::test_spy::TestSpyInterface;
    use std::sync::Mutex;
    use std::time::Duration;

    fn handle(spy: &TestSpyInterface, config: &BusConfig) -> BusHandle<TestSpyInterface> {
        initialize_bus(spy.split(), config).unwrap()
    }

    #[test]
    fn default_configuration_opens_all_banks() {
        let spy = TestSpyInterface::new();
        let bus = handle(&spy, &BusConfig::default());

        assert_eq!(bus.outputs().count(), 7);
        assert!(bus.input().is_some());
        for a in 0x20..=0x26 {
            assert_eq!(spy.direction(a), 0x0000);
            assert_eq!(spy.latch_writes(a), vec![0x0000]);
        }
        assert_eq!(spy.direction(0x27), 0xFFFF);
        assert_eq!(bus.stats().transfers, 8 * 4);
    }

    #[test]
    fn missing_bank_is_fatal() {
        let spy = TestSpyInterface::new();
        spy.remove(0x23);
        match initialize_bus(spy.split(), &BusConfig::default()) {
            Err(InitError::Handshake { id, .. }) => assert_eq!(id, DeviceId::D),
            Err(other) => panic!("expected handshake failure, got {:?}", other),
            Ok(_) => panic!("initialization succeeded without bank D"),
        }
        // Banks after the failed one are never touched.
        assert_eq!(spy.direction(0x24), 0xFFFF);
    }

    #[test]
    fn write_pin_on_device_addresses_the_right_bank() {
        let spy = TestSpyInterface::new();
        let bus = handle(&spy, &BusConfig::default());
        spy.clear_log();

        assert_eq!(bus.write_pin_on_device(5, 3, true), Ok(()));
        assert_eq!(spy.latch_writes(0x25), vec![0x0008]);
        assert_eq!(bus.output(DeviceId::F).unwrap().bits(), 0x0008);
        assert_eq!(spy.log().len(), 1);
    }

    #[test]
    fn bad_writes_send_nothing() {
        let spy = TestSpyInterface::new();
        let config = BusConfig::builder()
            .device(DeviceId::A, 0x20)
            .device(DeviceId::H, 0x27)
            .build()
            .unwrap();
        let bus = handle(&spy, &config);
        spy.clear_log();

        assert_eq!(bus.write_pin_on_device(8, 0, true), Err(WriteError::UnknownDevice(8)));
        assert_eq!(bus.write_pin_on_device(200, 0, true), Err(WriteError::UnknownDevice(200)));
        assert_eq!(
            bus.write_pin_on_device(7, 0, true),
            Err(WriteError::NotAnOutput(DeviceId::H))
        );
        assert_eq!(
            bus.write_pin_on_device(2, 0, true),
            Err(WriteError::NotConfigured(DeviceId::C))
        );
        assert_eq!(
            bus.write_pin_on_device(0, 16, true),
            Err(WriteError::PinOutOfRange(16))
        );
        assert_eq!(
            bus.write_all_on_device(1, 0xFFFF),
            Err(WriteError::NotConfigured(DeviceId::B))
        );
        assert!(spy.log().is_empty());
        assert_eq!(bus.output(DeviceId::A).unwrap().bits(), 0x0000);
    }

    #[test]
    fn reset_outputs_clears_every_bank() {
        let spy = TestSpyInterface::new();
        let bus = handle(&spy, &BusConfig::default());
        for index in 0..7 {
            assert_eq!(bus.write_all_on_device(index, 0xFFFF), Ok(()));
        }
        bus.reset_outputs();
        for bank in bus.outputs() {
            assert_eq!(bank.bits(), 0x0000);
            assert_eq!(spy.latch(bank.address().into()), 0x0000);
        }
    }

    #[test]
    fn input_bank_uses_configured_pullups_and_cache() {
        let spy = TestSpyInterface::new();
        let config = BusConfig::builder()
            .device(DeviceId::H, 0x27)
            .input_pullups(0x00FF)
            .cache_ttl(Duration::from_millis(40))
            .report_every(Duration::from_millis(1000))
            .build()
            .unwrap();
        let clock = ManualClock::new(0);
        let mut bus: BusHandle<TestSpyInterface, DefaultMutex<_>, ManualClock> =
            BusHandle::initialize(spy.split(), &config, clock.clone()).unwrap();
        assert_eq!(spy.pullups(0x27), 0x00FF);
        assert_eq!(bus.outputs().count(), 0);

        let reports = Arc::new(Mutex::new(0));
        let seen = reports.clone();
        bus.input_mut()
            .unwrap()
            .set_observer(move |_| *seen.lock().unwrap() += 1);

        spy.set_inputs(0x27, 0x0010);
        clock.set(40);
        let input = bus.input().unwrap();
        assert!(input.read(4));
        assert!(!input.read(5));
        clock.set(1000);
        input.read(4);
        assert_eq!(*reports.lock().unwrap(), 1);
    }
}
