//! Static configuration of the bus: which banks are fitted where, and the timing parameters of
//! arbitration and caching. Everything here is fixed once the bus is initialized.

use std::time::Duration;

use crate::device::{BankRegistry, BusAddress, DeviceId, DeviceSpec};
use crate::error::ConfigError;

/// How long a cached input value stays fresh.
pub const CACHE_TTL: Duration = Duration::from_millis(40);

/// How long one attempt at taking the bus waits before yielding and trying again.
pub const ACQUIRE_TIMEOUT: Duration = Duration::from_millis(200);

/// How long a cache-miss read waits for the bus before serving the stale value.
pub const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// How often poll statistics are reported, when reporting is switched on.
pub const REPORT_INTERVAL: Duration = Duration::from_millis(1000);

/// The validated bus configuration. Obtain one from `BusConfig::default()` for the reference
/// wiring, or from [`BusConfig::builder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    pub(crate) registry: BankRegistry,
    pub(crate) cache_ttl: Duration,
    pub(crate) acquire_timeout: Duration,
    pub(crate) read_timeout: Duration,
    pub(crate) report_interval: Option<Duration>,
    pub(crate) input_pullups: u16,
}

impl Default for BusConfig {
    /// Output banks `A` through `G` at `0x20..=0x26`, the input bank `H` at `0x27`, with the
    /// reference timing and reporting off.
    fn default() -> Self {
        let specs = DeviceId::ALL
            .iter()
            .zip(0x20u8..)
            .filter_map(|(&id, a)| BusAddress::new(a).map(|address| DeviceSpec { id, address }))
            .collect::<Vec<_>>();
        Self {
            registry: match BankRegistry::from_specs(&specs) {
                Ok(registry) => registry,
                Err(e) => unreachable!("reference bank table is invalid: {}", e),
            },
            cache_ttl: CACHE_TTL,
            acquire_timeout: ACQUIRE_TIMEOUT,
            read_timeout: READ_TIMEOUT,
            report_interval: None,
            input_pullups: 0,
        }
    }
}

impl BusConfig {
    /// Begin building a configuration from an empty bank table and the reference timing.
    pub fn builder() -> Configurator {
        Configurator::new()
    }

    pub fn registry(&self) -> &BankRegistry {
        &self.registry
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    pub fn acquire_timeout(&self) -> Duration {
        self.acquire_timeout
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn report_interval(&self) -> Option<Duration> {
        self.report_interval
    }

    pub fn input_pullups(&self) -> u16 {
        self.input_pullups
    }
}

/// A `Configurator` collects the bank table and timing parameters. Chain method calls on it and
/// end the chain with `build()`, which checks the result.
///
/// ```
/// # use expander_bank::{BusConfig, DeviceId};
/// # use std::time::Duration;
/// let config = BusConfig::builder()
///     .device(DeviceId::A, 0x20)
///     .device(DeviceId::B, 0x21)
///     .device(DeviceId::H, 0x27)
///     .input_pullups(0xFFFF)
///     .report_every(Duration::from_secs(1))
///     .build()
///     .unwrap();
/// assert_eq!(config.registry().len(), 3);
/// ```
#[must_use = "Configuration is not usable until built"]
pub struct Configurator {
    devices: Vec<(DeviceId, u8)>,
    cache_ttl: Duration,
    acquire_timeout: Duration,
    read_timeout: Duration,
    report_interval: Option<Duration>,
    input_pullups: u16,
}

impl Configurator {
    fn new() -> Self {
        Self {
            devices: Vec::new(),
            cache_ttl: CACHE_TTL,
            acquire_timeout: ACQUIRE_TIMEOUT,
            read_timeout: READ_TIMEOUT,
            report_interval: None,
            input_pullups: 0,
        }
    }

    /// Fit bank `id` at 7-bit bus address `address`.
    pub fn device(mut self, id: DeviceId, address: u8) -> Self {
        self.devices.push((id, address));
        self
    }

    /// Set how long a cached input value is served before the next read goes to the bus.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set how long each attempt to take the bus for a write waits before yielding.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set how long a cache-miss read waits for the bus before giving up on this refresh.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Report and reset per-pin poll statistics every `interval`.
    pub fn report_every(mut self, interval: Duration) -> Self {
        self.report_interval = Some(interval);
        self
    }

    /// Enable the weak pull-ups of the input bank for each set bit of `mask`.
    pub fn input_pullups(mut self, mask: u16) -> Self {
        self.input_pullups = mask;
        self
    }

    /// Check and produce the configuration.
    pub fn build(self) -> Result<BusConfig, ConfigError> {
        let specs = self
            .devices
            .iter()
            .map(|&(id, raw)| {
                BusAddress::new(raw)
                    .map(|address| DeviceSpec { id, address })
                    .ok_or(ConfigError::InvalidAddress(raw))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let registry = BankRegistry::from_specs(&specs)?;

        let zero = Duration::from_millis(0);
        if self.cache_ttl == zero {
            return Err(ConfigError::ZeroDuration("cache TTL"));
        }
        if self.acquire_timeout == zero {
            return Err(ConfigError::ZeroDuration("acquire timeout"));
        }
        if self.read_timeout == zero {
            return Err(ConfigError::ZeroDuration("read timeout"));
        }
        if self.report_interval == Some(zero) {
            return Err(ConfigError::ZeroDuration("report interval"));
        }

        Ok(BusConfig {
            registry,
            cache_ttl: self.cache_ttl,
            acquire_timeout: self.acquire_timeout,
            read_timeout: self.read_timeout,
            report_interval: self.report_interval,
            input_pullups: self.input_pullups,
        })
    }
}
