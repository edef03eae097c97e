use log::debug;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::GatewayError;
use crate::gpio::{Direction, GpioGateway};

pub const DEFAULT_SYSFS_ROOT: &str = "/sys/class/gpio";

const SETTLE_DEFAULT_ATTEMPTS: u32 = 20;
const SETTLE_DEFAULT_INTERVAL: Duration = Duration::from_millis(10);

/// Control file locations under a sysfs GPIO root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysfsPaths {
    root: PathBuf,
}

impl SysfsPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn export(&self) -> PathBuf {
        self.root.join("export")
    }

    pub fn unexport(&self) -> PathBuf {
        self.root.join("unexport")
    }

    pub fn pin_dir(&self, pin: u32) -> PathBuf {
        self.root.join(format!("gpio{pin}"))
    }

    pub fn direction(&self, pin: u32) -> PathBuf {
        self.pin_dir(pin).join("direction")
    }

    pub fn value(&self, pin: u32) -> PathBuf {
        self.pin_dir(pin).join("value")
    }
}

impl Default for SysfsPaths {
    fn default() -> Self {
        Self::new(DEFAULT_SYSFS_ROOT)
    }
}

/// How long to wait for the kernel to create `gpio<N>` after an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlePolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            attempts: SETTLE_DEFAULT_ATTEMPTS,
            interval: SETTLE_DEFAULT_INTERVAL,
        }
    }
}

pub struct SysfsGateway {
    paths: SysfsPaths,
    settle: SettlePolicy,
}

impl SysfsGateway {
    pub fn new(paths: SysfsPaths, settle: SettlePolicy) -> Self {
        Self { paths, settle }
    }

    pub fn paths(&self) -> &SysfsPaths {
        &self.paths
    }

    // Control files already exist; never create them.
    fn write_control(path: &Path, payload: &[u8]) -> Result<(), GatewayError> {
        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| GatewayError::io(path, e))?;
        file.write_all(payload)
            .map_err(|e| GatewayError::io(path, e))
    }

    fn read_control(path: &Path) -> Result<String, GatewayError> {
        fs::read_to_string(path)
            .map(|s| s.trim().to_string())
            .map_err(|e| GatewayError::io(path, e))
    }

    fn wait_for_pin_dir(&self, pin: u32) -> Result<(), GatewayError> {
        let started = Instant::now();
        for attempt in 1..=self.settle.attempts {
            if self.is_exported(pin) {
                if attempt > 1 {
                    debug!("gpio{pin} appeared after {:?}", started.elapsed());
                }
                return Ok(());
            }
            if attempt < self.settle.attempts {
                thread::sleep(self.settle.interval);
            }
        }
        Err(GatewayError::SettleTimeout {
            pin,
            waited: started.elapsed(),
        })
    }
}

impl GpioGateway for SysfsGateway {
    fn is_exported(&self, pin: u32) -> bool {
        self.paths.pin_dir(pin).is_dir()
    }

    fn export(&self, pin: u32) -> Result<(), GatewayError> {
        Self::write_control(&self.paths.export(), pin.to_string().as_bytes())
    }

    fn set_direction(&self, pin: u32, direction: Direction) -> Result<(), GatewayError> {
        let path = self.paths.direction(pin);
        if !direction.is_valid() {
            return Err(GatewayError::Malformed {
                path,
                content: direction.to_string(),
            });
        }
        self.wait_for_pin_dir(pin)?;
        Self::write_control(&path, direction.as_str().as_bytes())
    }

    fn read_direction(&self, pin: u32) -> Result<Direction, GatewayError> {
        let raw = Self::read_control(&self.paths.direction(pin))?;
        Ok(match raw.as_str() {
            "out" => Direction::Output,
            _ => Direction::Input,
        })
    }

    fn write_value(&self, pin: u32, value: u8) -> Result<(), GatewayError> {
        let payload = if value == 0 { b"0" } else { b"1" };
        Self::write_control(&self.paths.value(pin), payload)
    }

    fn read_value(&self, pin: u32) -> Result<u8, GatewayError> {
        let path = self.paths.value(pin);
        let raw = Self::read_control(&path)?;
        match raw.as_str() {
            "0" => Ok(0),
            "1" => Ok(1),
            _ => Err(GatewayError::Malformed { path, content: raw }),
        }
    }

    fn unexport(&self, pin: u32) -> Result<(), GatewayError> {
        Self::write_control(&self.paths.unexport(), pin.to_string().as_bytes())
    }
}
