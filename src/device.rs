//! Identity of the expander banks on the bus.

use std::fmt;

use crate::error::ConfigError;

/// A 7-bit I2C address of an MCP23X17. The chip fixes the upper four bits to `0b0100`, and the
/// three hardware address pins select the rest, so only `0x20..=0x27` can exist.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
pub struct BusAddress(u8);

impl BusAddress {
    /// Returns `Some` if `addr` is an address an MCP23X17 can be strapped to.
    pub fn new(addr: u8) -> Option<Self> {
        match addr {
            0x20..=0x27 => Some(BusAddress(addr)),
            _ => None,
        }
    }
}

impl From<BusAddress> for u8 {
    fn from(addr: BusAddress) -> u8 {
        addr.0
    }
}

impl fmt::Display for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// Whether a bank drives its pins or samples them. A bank is all-output or all-input.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Direction {
    Output,
    Input,
}

/// The logical expander banks. Banks `A` through `G` drive outputs; `H` carries the button
/// inputs.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
pub enum DeviceId {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
}

impl DeviceId {
    /// Every bank, in index order.
    pub const ALL: [DeviceId; 8] = [
        DeviceId::A,
        DeviceId::B,
        DeviceId::C,
        DeviceId::D,
        DeviceId::E,
        DeviceId::F,
        DeviceId::G,
        DeviceId::H,
    ];

    /// Look up a bank by its numeric index (`0` is `A`). Returns `None` for indexes that don't
    /// name a bank, so callers addressing banks dynamically can never land on the wrong one.
    pub fn from_index(index: u8) -> Option<DeviceId> {
        DeviceId::ALL.get(index as usize).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn direction(self) -> Direction {
        match self {
            DeviceId::H => Direction::Input,
            _ => Direction::Output,
        }
    }
}

/// A configured device: which bank lives at which address.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct DeviceSpec {
    pub id: DeviceId,
    pub address: BusAddress,
}

impl DeviceSpec {
    pub fn new(id: DeviceId, address: BusAddress) -> Self {
        Self { id, address }
    }
}

/// The static table of banks to bus addresses. Built once from the configuration and never
/// changed afterward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankRegistry {
    slots: [Option<BusAddress>; 8],
}

impl BankRegistry {
    /// Build the table, rejecting a bank listed twice or two banks sharing an address.
    pub fn from_specs(specs: &[DeviceSpec]) -> Result<Self, ConfigError> {
        let mut slots = [None; 8];
        for spec in specs {
            if slots[spec.id.index()].is_some() {
                return Err(ConfigError::DuplicateDevice(spec.id));
            }
            if let Some(other) = DeviceId::ALL
                .iter()
                .find(|id| slots[id.index()] == Some(spec.address))
            {
                return Err(ConfigError::DuplicateAddress {
                    address: spec.address,
                    first: *other,
                    second: spec.id,
                });
            }
            slots[spec.id.index()] = Some(spec.address);
        }
        Ok(Self { slots })
    }

    /// The bus address of `id`, or `None` if that bank is not fitted.
    pub fn address(&self, id: DeviceId) -> Option<BusAddress> {
        self.slots[id.index()]
    }

    /// Iterate the fitted banks in index order.
    pub fn iter(&self) -> impl Iterator<Item = DeviceSpec> + '_ {
        DeviceId::ALL.iter().filter_map(move |&id| {
            self.slots[id.index()].map(|address| DeviceSpec { id, address })
        })
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
