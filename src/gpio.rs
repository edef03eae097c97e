use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GpioError};
use crate::registry::PinRegistry;

#[derive(Debug, Default, Hash, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    #[default]
    #[serde(rename = "unset")]
    Unset,
    #[serde(rename = "in")]
    Input,
    #[serde(rename = "out")]
    Output,
}

impl Direction {
    /// Parses the sysfs spelling. Anything other than `in`/`out` is `Unset`.
    pub fn parse(s: &str) -> Self {
        match s {
            "in" => Direction::Input,
            "out" => Direction::Output,
            _ => Direction::Unset,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Unset => "unset",
            Direction::Input => "in",
            Direction::Output => "out",
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Direction::Input | Direction::Output)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw access to the kernel GPIO control files.
///
/// Implementations perform blocking I/O and report failures without
/// classifying them; the controller treats every error as opaque.
pub trait GpioGateway: Send + Sync {
    fn is_exported(&self, pin: u32) -> bool;
    fn export(&self, pin: u32) -> Result<(), GatewayError>;
    fn set_direction(&self, pin: u32, direction: Direction) -> Result<(), GatewayError>;
    fn read_direction(&self, pin: u32) -> Result<Direction, GatewayError>;
    fn write_value(&self, pin: u32, value: u8) -> Result<(), GatewayError>;
    fn read_value(&self, pin: u32) -> Result<u8, GatewayError>;
    fn unexport(&self, pin: u32) -> Result<(), GatewayError>;
}

/// Registry and hardware view of a single pin.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PinStatus {
    pub pin: u32,
    pub registered: Option<Direction>,
    pub hardware_exported: bool,
    pub hardware_direction: Option<Direction>,
}

/// One mutex per pin number, so that operations on the same pin run one at a
/// time while different pins proceed independently.
///
/// Entries only live while an operation holds or waits on them; the map is
/// empty whenever the controller is idle.
#[derive(Default)]
struct PinLocks {
    locks: Mutex<FxHashMap<u32, Arc<Mutex<()>>>>,
}

impl PinLocks {
    /// Runs `f` while holding the lock for `pin`.
    fn run<T>(&self, pin: u32, f: impl FnOnce() -> T) -> T {
        let lock = self.locks.lock().entry(pin).or_default().clone();
        let result = {
            let _guard = lock.lock();
            f()
        };
        drop(lock);

        let mut locks = self.locks.lock();
        if locks.get(&pin).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(&pin);
        }
        result
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().len()
    }
}

pub struct PinController<G: GpioGateway> {
    gateway: Arc<G>,
    registry: Mutex<PinRegistry>,
    locks: PinLocks,
}

impl<G: GpioGateway> PinController<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        Self {
            gateway,
            registry: Mutex::new(PinRegistry::new()),
            locks: PinLocks::default(),
        }
    }

    /// Reserves `pin` and configures its direction.
    ///
    /// If the direction cannot be set the pin is released again, so the
    /// registry never holds a pin whose direction was not applied.
    pub fn export_pin(&self, pin: i64, direction: Direction) -> Result<(), GpioError> {
        if !direction.is_valid() {
            debug!("export of pin {pin} rejected: direction {direction}");
            return Err(GpioError::InvalidDirection);
        }
        let pin_id = u32::try_from(pin).map_err(|_| GpioError::InvalidPin(pin))?;

        self.locks.run(pin_id, || {
            if self.registry.lock().contains(pin_id) {
                debug!("pin {pin_id} already exported");
                return Err(GpioError::AlreadyExported(pin_id));
            }

            if let Err(e) = self.gateway.export(pin_id) {
                warn!("export of pin {pin_id} failed: {e}");
                return Err(e.into());
            }

            if let Err(e) = self.gateway.set_direction(pin_id, direction) {
                warn!("setting direction {direction} on pin {pin_id} failed: {e}");
                if let Err(undo) = self.gateway.unexport(pin_id) {
                    error!("releasing pin {pin_id} after failed setup: {undo}");
                }
                return Err(e.into());
            }

            self.registry
                .lock()
                .add(pin_id, direction)
                .map_err(|_| GpioError::AlreadyExported(pin_id))?;

            info!("pin {pin_id} exported as {direction}");
            Ok(())
        })
    }

    /// Releases `pin`. The registry entry is dropped even when the kernel
    /// refuses the unexport; that failure is still reported.
    pub fn unexport_pin(&self, pin: i64) -> Result<(), GpioError> {
        let pin_id = Self::registered_id(pin)?;

        self.locks.run(pin_id, || {
            if !self.registry.lock().contains(pin_id) {
                return Err(GpioError::NotExported(pin));
            }

            let result = self.gateway.unexport(pin_id);
            self.registry.lock().remove(pin_id);

            match result {
                Ok(()) => {
                    info!("pin {pin_id} unexported");
                    Ok(())
                }
                Err(e) => {
                    warn!("unexport of pin {pin_id} failed, dropped from registry anyway: {e}");
                    Err(e.into())
                }
            }
        })
    }

    pub fn set_value(&self, pin: i64, value: i64) -> Result<(), GpioError> {
        let bit = match value {
            0 => 0,
            1 => 1,
            _ => return Err(GpioError::InvalidValue(value)),
        };
        let pin_id = Self::registered_id(pin)?;

        self.locks.run(pin_id, || {
            let direction = self.registry.lock().direction_of(pin_id);
            match direction {
                Direction::Unset => return Err(GpioError::NotExported(pin)),
                Direction::Input => {
                    debug!("write to input pin {pin_id} rejected");
                    return Err(GpioError::InvalidDirection);
                }
                Direction::Output => {}
            }

            self.gateway.write_value(pin_id, bit).map_err(|e| {
                warn!("writing {bit} to pin {pin_id} failed: {e}");
                GpioError::from(e)
            })
        })
    }

    pub fn get_value(&self, pin: i64) -> Result<u8, GpioError> {
        let pin_id = Self::registered_id(pin)?;

        self.locks.run(pin_id, || {
            if !self.registry.lock().contains(pin_id) {
                return Err(GpioError::NotExported(pin));
            }

            self.gateway.read_value(pin_id).map_err(|e| {
                warn!("reading pin {pin_id} failed: {e}");
                GpioError::from(e)
            })
        })
    }

    pub fn list_exported_pins(&self) -> Result<BTreeMap<u32, Direction>, GpioError> {
        Ok(self.registry.lock().snapshot())
    }

    /// Compares the registry with what the control files report, e.g. to
    /// find pins left exported by an earlier run.
    pub fn pin_status(&self, pin: i64) -> Result<PinStatus, GpioError> {
        let pin_id = u32::try_from(pin).map_err(|_| GpioError::InvalidPin(pin))?;

        self.locks.run(pin_id, || -> Result<PinStatus, GpioError> {
            let registered = match self.registry.lock().direction_of(pin_id) {
                Direction::Unset => None,
                dir => Some(dir),
            };
            let hardware_exported = self.gateway.is_exported(pin_id);
            let hardware_direction = if hardware_exported {
                Some(self.gateway.read_direction(pin_id)?)
            } else {
                None
            };

            Ok(PinStatus {
                pin: pin_id,
                registered,
                hardware_exported,
                hardware_direction,
            })
        })
    }

    /// Negative or oversized numbers can never be registered.
    fn registered_id(pin: i64) -> Result<u32, GpioError> {
        u32::try_from(pin).map_err(|_| GpioError::NotExported(pin))
    }
}
