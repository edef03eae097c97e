use std::io;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::GatewayError;
use crate::gpio::{Direction, GpioGateway};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    IsExported,
    Export,
    SetDirection,
    ReadDirection,
    WriteValue,
    ReadValue,
    Unexport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayCall {
    pub op: GatewayOp,
    pub pin: u32,
}

/// In-memory stand-in for the sysfs tree.
///
/// Mirrors the kernel's behaviour for the cases the controller cares about
/// (double export, unexport of an unknown pin, writing an input line) and
/// lets tests inject failures per operation and pin.
#[derive(Default)]
pub struct MockGateway {
    state: Mutex<MockState>,
    latency: Duration,
}

#[derive(Default)]
struct MockState {
    lines: FxHashMap<u32, MockLine>,
    failures: FxHashSet<(GatewayOp, u32)>,
    calls: Vec<GatewayCall>,
}

#[derive(Clone, Copy)]
struct MockLine {
    direction: Direction,
    value: u8,
}

impl MockGateway {
    /// `export` sleeps for `latency` before touching state, which widens
    /// race windows in concurrency tests. No other operation sleeps.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub fn fail(&self, op: GatewayOp, pin: u32) {
        self.state.lock().failures.insert((op, pin));
    }

    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().calls.clone()
    }

    /// Drives the level seen on an exported line. Returns false if the pin
    /// is not exported.
    pub fn set_input_level(&self, pin: u32, value: u8) -> bool {
        match self.state.lock().lines.get_mut(&pin) {
            Some(line) => {
                line.value = value;
                true
            }
            None => false,
        }
    }

    fn begin(&self, op: GatewayOp, pin: u32) -> Result<MutexGuard<'_, MockState>, GatewayError> {
        let mut state = self.state.lock();
        state.calls.push(GatewayCall { op, pin });
        if state.failures.contains(&(op, pin)) {
            return Err(mock_error(pin, format!("injected {op:?} failure")));
        }
        Ok(state)
    }
}

fn mock_error(pin: u32, msg: String) -> GatewayError {
    GatewayError::io(PathBuf::from(format!("mock/gpio{pin}")), io::Error::other(msg))
}

impl GpioGateway for MockGateway {
    fn is_exported(&self, pin: u32) -> bool {
        let mut state = self.state.lock();
        state.calls.push(GatewayCall {
            op: GatewayOp::IsExported,
            pin,
        });
        state.lines.contains_key(&pin)
    }

    fn export(&self, pin: u32) -> Result<(), GatewayError> {
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
        let mut state = self.begin(GatewayOp::Export, pin)?;
        if state.lines.contains_key(&pin) {
            return Err(mock_error(pin, "device or resource busy".into()));
        }
        state.lines.insert(
            pin,
            MockLine {
                direction: Direction::Input,
                value: 0,
            },
        );
        Ok(())
    }

    fn set_direction(&self, pin: u32, direction: Direction) -> Result<(), GatewayError> {
        let mut state = self.begin(GatewayOp::SetDirection, pin)?;
        if !direction.is_valid() {
            return Err(mock_error(pin, format!("invalid direction {direction}")));
        }
        let line = state
            .lines
            .get_mut(&pin)
            .ok_or_else(|| mock_error(pin, "no such control directory".into()))?;
        line.direction = direction;
        if direction == Direction::Output {
            line.value = 0;
        }
        Ok(())
    }

    fn read_direction(&self, pin: u32) -> Result<Direction, GatewayError> {
        let state = self.begin(GatewayOp::ReadDirection, pin)?;
        state
            .lines
            .get(&pin)
            .map(|line| line.direction)
            .ok_or_else(|| mock_error(pin, "no such control directory".into()))
    }

    fn write_value(&self, pin: u32, value: u8) -> Result<(), GatewayError> {
        let mut state = self.begin(GatewayOp::WriteValue, pin)?;
        let line = state
            .lines
            .get_mut(&pin)
            .ok_or_else(|| mock_error(pin, "no such control directory".into()))?;
        if line.direction != Direction::Output {
            return Err(mock_error(pin, "operation not permitted".into()));
        }
        line.value = value;
        Ok(())
    }

    fn read_value(&self, pin: u32) -> Result<u8, GatewayError> {
        let state = self.begin(GatewayOp::ReadValue, pin)?;
        state
            .lines
            .get(&pin)
            .map(|line| line.value)
            .ok_or_else(|| mock_error(pin, "no such control directory".into()))
    }

    fn unexport(&self, pin: u32) -> Result<(), GatewayError> {
        let mut state = self.begin(GatewayOp::Unexport, pin)?;
        state
            .lines
            .remove(&pin)
            .map(|_| ())
            .ok_or_else(|| mock_error(pin, "invalid argument".into()))
    }
}
