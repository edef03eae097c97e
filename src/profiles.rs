//! Named pin sets stored in a JSON file and applied to a controller.

use log::{info, warn};
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::gpio::{Direction, GpioGateway, PinController};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinProfile {
    pub number: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub direction: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub pins: Vec<PinProfile>,
}

impl Profile {
    /// Collects every problem instead of stopping at the first one.
    pub fn validate(&self) -> Result<(), AppError> {
        let mut problems = Vec::new();

        if self.name.trim().is_empty() {
            problems.push("profile name is empty".to_string());
        }
        if self.pins.is_empty() {
            problems.push("profile has no pins".to_string());
        }

        let mut seen = HashSet::new();
        for (pos, pin) in self.pins.iter().enumerate() {
            if pin.number < 0 {
                problems.push(format!("invalid pin number {} at position {pos}", pin.number));
            } else if !seen.insert(pin.number) {
                problems.push(format!("duplicate pin number {} at position {pos}", pin.number));
            }
            if !Direction::parse(&pin.direction).is_valid() {
                problems.push(format!(
                    "invalid direction '{}' at position {pos}",
                    pin.direction
                ));
            }
            if let Some(alias) = &pin.alias
                && !is_valid_alias(alias)
            {
                problems.push(format!("invalid alias '{alias}' at position {pos}"));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(AppError::Profile(problems.join("; ")))
        }
    }

    /// Exports every pin of the profile in order and returns how many were
    /// newly exported. Pins already held with the same direction are skipped.
    pub fn apply<G: GpioGateway>(&self, controller: &PinController<G>) -> Result<usize, AppError> {
        self.validate()?;

        let current = controller.list_exported_pins()?;
        let mut exported = 0;
        for pin in &self.pins {
            let direction = Direction::parse(&pin.direction);
            let held = u32::try_from(pin.number)
                .ok()
                .and_then(|id| current.get(&id).copied());
            if held == Some(direction) {
                continue;
            }
            controller.export_pin(pin.number, direction).map_err(|e| {
                warn!("profile '{}': pin {} not applied: {e}", self.name, pin.number);
                AppError::from(e)
            })?;
            exported += 1;
        }

        info!("profile '{}' applied, {exported} pin(s) exported", self.name);
        Ok(exported)
    }
}

fn is_valid_alias(alias: &str) -> bool {
    let mut chars = alias.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Profiles kept as a JSON array in a single file.
pub struct JsonProfileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self, name: &str) -> Result<Profile, AppError> {
        self.read_all()?
            .into_iter()
            .find(|p| p.name == name)
            .ok_or_else(|| AppError::ProfileNotFound(name.to_string()))
    }

    /// Replaces the profile with the same name, or appends it.
    pub fn save(&self, profile: &Profile) -> Result<(), AppError> {
        profile.validate()?;

        let _guard = self.write_lock.lock();
        let mut profiles = self.read_all()?;
        match profiles.iter_mut().find(|p| p.name == profile.name) {
            Some(existing) => *existing = profile.clone(),
            None => profiles.push(profile.clone()),
        }

        let data = serde_json::to_vec_pretty(&profiles)
            .map_err(|e| AppError::Profile(format!("Failed to encode profiles: {e}")))?;
        fs::write(&self.path, data).map_err(|e| {
            AppError::Profile(format!(
                "Failed to write {}: {e}",
                self.path.display()
            ))
        })?;

        info!("profile '{}' saved to {}", profile.name, self.path.display());
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<Profile>, AppError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(AppError::Profile(format!(
                    "Failed to read {}: {e}",
                    self.path.display()
                )));
            }
        };
        serde_json::from_str(&contents)
            .map_err(|e| AppError::Profile(format!("Invalid profile json: {e}")))
    }
}
