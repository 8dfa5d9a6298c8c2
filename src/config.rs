/// Run configuration.
/// Presets mirror the demo page defaults; any field can be overridden from a
/// JSON file or the command line.
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::matrix;
use crate::systolic::ReadAccounting;

pub const DEFAULT_METRICS_PATH: &str = "/tmp/tpusim_live.json";

/// Playback speed bounds (the demo's speed slider).
pub const MIN_SPEED: u32 = 1;
pub const MAX_SPEED: u32 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Matrix dimension N
    pub size: usize,
    /// Smallest random matrix entry (inclusive)
    pub value_min: i64,
    /// Largest random matrix entry (inclusive)
    pub value_max: i64,
    /// Fixed RNG seed; None draws from OS entropy
    pub seed: Option<u64>,
    /// Playback speed in [1, 10]
    pub speed: u32,
    pub accounting: ReadAccounting,
    /// Where the live snapshot is published
    pub metrics_path: String,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::demo()
    }
}

impl SimConfig {
    /// The 6×6 demo with entries in [1, 5].
    pub fn demo() -> Self {
        SimConfig {
            size: 6,
            value_min: 1,
            value_max: 5,
            seed: None,
            speed: 5,
            accounting: ReadAccounting::RowEntry,
            metrics_path: DEFAULT_METRICS_PATH.to_string(),
        }
    }

    /// The 2×2 worked example, small enough to follow by hand.
    pub fn tiny() -> Self {
        SimConfig { size: 2, ..Self::demo() }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|source| SimError::ConfigIo {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&data)
    }

    pub fn validate(&self) -> Result<()> {
        matrix::check_size(self.size)?;
        if self.value_min > self.value_max {
            return Err(SimError::InvalidRange { min: self.value_min, max: self.value_max });
        }
        matrix::check_dot_range(self.size, self.value_min, self.value_max)?;
        if !(MIN_SPEED..=MAX_SPEED).contains(&self.speed) {
            return Err(SimError::Config(format!(
                "speed {} outside [{}, {}]",
                self.speed, MIN_SPEED, MAX_SPEED
            )));
        }
        if self.metrics_path.is_empty() {
            return Err(SimError::Config("metrics_path is empty".to_string()));
        }
        Ok(())
    }

    /// Delay between steps when playing: 600 ms minus 55 ms per speed
    /// notch, never below 80 ms.
    pub fn step_interval(&self) -> Duration {
        let ms = 600i64 - 55 * self.speed as i64;
        Duration::from_millis(ms.max(80) as u64)
    }
}
