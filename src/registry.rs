//! Bookkeeping of the pins reserved by this process.
//!
//! The registry knows nothing about hardware. It is not synchronized; the
//! owning [`crate::gpio::PinController`] guards it.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::gpio::Direction;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("pin {pin} already registered as {current}, requested {requested}")]
    Conflict {
        pin: u32,
        current: Direction,
        requested: Direction,
    },
}

#[derive(Debug, Default)]
pub struct PinRegistry {
    pins: FxHashMap<u32, Direction>,
}

impl PinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `pin`. Re-adding with the same direction is a no-op; the
    /// direction of a registered pin cannot be changed in place.
    pub fn add(&mut self, pin: u32, direction: Direction) -> Result<(), RegistryError> {
        match self.pins.get(&pin) {
            Some(current) if *current == direction => Ok(()),
            Some(current) => Err(RegistryError::Conflict {
                pin,
                current: *current,
                requested: direction,
            }),
            None => {
                self.pins.insert(pin, direction);
                Ok(())
            }
        }
    }

    /// Unregisters `pin`, returning its direction if it was registered.
    pub fn remove(&mut self, pin: u32) -> Option<Direction> {
        self.pins.remove(&pin)
    }

    pub fn contains(&self, pin: u32) -> bool {
        self.pins.contains_key(&pin)
    }

    /// `Direction::Unset` when the pin is not registered.
    pub fn direction_of(&self, pin: u32) -> Direction {
        self.pins.get(&pin).copied().unwrap_or(Direction::Unset)
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    pub fn snapshot(&self) -> BTreeMap<u32, Direction> {
        self.pins.iter().map(|(pin, dir)| (*pin, *dir)).collect()
    }
}
