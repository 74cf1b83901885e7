//! Shared-bus driver for a bank of Microchip MCP23X17 I/O expanders.
//!
//! The MCP23017 (I2C) and MCP23S17 (SPI) each provide 16 GPIO pins in two 8-bit ports. Up to
//! eight of them share one bus, at addresses `0x20` through `0x27`. This crate drives such a bank
//! as seven 16-bit output banks (`A` through `G`) and one input bank (`H`) carrying buttons, from
//! any number of threads at once.
//!
//! The bus is the contended resource. Every transfer goes through a single [`BusArbiter`], which
//! holds the bus for exactly one register access at a time. On top of it:
//!
//! - each output bank keeps a mirror of its latch, so a single-pin write becomes one arbitrated
//!   16-bit write that can never undo a concurrent write to another pin of the same bank;
//! - the input bank sits behind a [`ReadCache`] with a short per-pin TTL, so tight polling loops
//!   are answered from memory and a busy bus yields a stale value instead of a stalled task.
//!
//! Writes are never dropped: they wait for the bus as long as it takes, yielding between
//! attempts. Reads are never blocked for long: a cache miss makes one bounded attempt.
//!
//! # Construction
//!
//! - Use your platform's `embedded-hal` implementation to obtain the I2C master the expanders
//!   are connected to.
//! - Wrap it in an [`I2cInterface`], or implement [`BusInterface`] for your own bus.
//! - Describe which banks are fitted with a [`BusConfig`]. The default is the full bank of
//!   eight at their reference addresses.
//! - Call [`initialize_bus`]. It opens every bank and refuses to return a handle if any bank
//!   fails its handshake.
//!
//! ```ignore
//! let i2c = /* construct something implementing embedded_hal::blocking::i2c::{Write, WriteRead} */
//!
//! let iface = expander_bank::I2cInterface::new(i2c);
//! let bus = expander_bank::initialize_bus(iface, &expander_bank::BusConfig::default())?;
//! ```
//!
//! # Bus configuration
//!
//! *See [`BusConfig::builder`] and [`Configurator`].*
//!
//! ```
//! # use expander_bank::{BusConfig, DeviceId, InitError};
//! # use std::time::Duration;
//! # fn main() -> Result<(), InitError<core::convert::Infallible>> {
//! let config = BusConfig::builder()
//!     .device(DeviceId::A, 0x20)
//!     .device(DeviceId::B, 0x21)
//!     .device(DeviceId::H, 0x27)
//!     .input_pullups(0xFFFF)
//!     .cache_ttl(Duration::from_millis(40))
//!     .build()?;
//! # let iface = expander_bank::interface::noop::NoopInterface::default();
//! let bus = expander_bank::initialize_bus(iface, &config)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Outputs
//!
//! *See [`OutputBank`] and [`BusHandle::write_pin_on_device`].*
//!
//! ```
//! # use expander_bank::{BusConfig, DeviceId, WriteError};
//! # let iface = expander_bank::interface::noop::NoopInterface::default();
//! # let bus = expander_bank::initialize_bus(iface, &BusConfig::default()).unwrap();
//! let relays = bus.output(DeviceId::C).unwrap();
//! relays.write_all(0x00FF);
//! assert_eq!(relays.write_pin(15, true), Ok(()));
//! assert_eq!(relays.bits(), 0x80FF);
//!
//! // Banks can also be addressed by number, as long as the number names a fitted output bank.
//! assert_eq!(bus.write_pin_on_device(2, 0, false), Ok(()));
//! assert_eq!(
//!     bus.write_pin_on_device(7, 0, true),
//!     Err(WriteError::NotAnOutput(DeviceId::H))
//! );
//! ```
//!
//! # Inputs
//!
//! *See [`ReadCache`].*
//!
//! ```
//! # use expander_bank::BusConfig;
//! # let iface = expander_bank::interface::noop::NoopInterface::default();
//! # let bus = expander_bank::initialize_bus(iface, &BusConfig::default()).unwrap();
//! let buttons = bus.input().unwrap();
//! let pressed = buttons.read(4);
//! # assert!(!pressed);
//! // Out-of-range pins read low.
//! assert!(!buttons.read(16));
//! ```
//!
//! # HAL pins
//!
//! Single pins of either kind can be handed to drivers written against `embedded-hal`:
//! [`OutputBank::pin`] produces a [`BankPin`] implementing `OutputPin`, and [`ReadCache::pin`]
//! produces a [`CachedPin`] implementing `InputPin`.
//!
//! ```
//! # struct MyTrafficLight<P>(core::marker::PhantomData<P>);
//! # impl<P> MyTrafficLight<P> where P: embedded_hal::digital::v2::OutputPin {
//! #   fn new(r: P, y: P, g: P) -> Self { Self(core::marker::PhantomData) }
//! #   fn change_to_red(&mut self) {}
//! # }
//! # use expander_bank::{BusConfig, DeviceId};
//! # let iface = expander_bank::interface::noop::NoopInterface::default();
//! # let bus = expander_bank::initialize_bus(iface, &BusConfig::default()).unwrap();
//! let lamps = bus.output(DeviceId::A).unwrap();
//! let mut traffic_light = MyTrafficLight::new(
//!     lamps.pin(4).unwrap(),
//!     lamps.pin(5).unwrap(),
//!     lamps.pin(6).unwrap(),
//! );
//! traffic_light.change_to_red();
//! ```
//!
//! ## Mutual exclusion
//!
//! The arbiter is parameterized over a type implementing [`BusMutex`], a lock with a timed
//! acquisition. [`DefaultMutex<T>`] is `parking_lot::Mutex<T>`; substitute your own to run on a
//! different scheduler.

#[cfg(test)]
extern crate proptest;

extern crate embedded_hal as hal;

pub mod arbiter;
pub mod clock;
pub mod config;
pub mod device;
pub mod error;
pub mod expander;
pub mod handle;
pub mod interface;
pub mod mutex;
pub mod registers;

pub use arbiter::{BusArbiter, BusStats};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{BusConfig, Configurator};
pub use device::{BankRegistry, BusAddress, DeviceId, DeviceSpec, Direction};
pub use error::{ConfigError, InitError, WriteError};
pub use expander::input::{CacheEntry, PinStats, PollReport, ReadCache};
pub use expander::output::OutputBank;
pub use expander::pin::{BankPin, CachedPin};
pub use handle::{initialize_bus, BusHandle};
pub use interface::i2c::I2cInterface;
pub use interface::BusInterface;
pub use mutex::{BusMutex, DefaultMutex};
