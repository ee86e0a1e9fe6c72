// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use serde::Deserialize;

use crate::morph::{DEFAULT_BEATS_PER_BAR, DEFAULT_BPM};

use super::error::ConfigError;

/// The internal beat clock.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Clock {
    /// Whether the clock runs at startup (default: false).
    enabled: Option<bool>,

    /// The starting tempo (default: 120).
    bpm: Option<f64>,

    /// Beats in a bar (default: 4).
    beats_per_bar: Option<u8>,
}

impl Clock {
    pub fn enabled(&self) -> bool {
        self.enabled.unwrap_or(false)
    }

    /// Returns the starting tempo. The clock clamps it into range.
    pub fn bpm(&self) -> f64 {
        self.bpm.unwrap_or(DEFAULT_BPM)
    }

    pub fn beats_per_bar(&self) -> Result<u8, ConfigError> {
        match self.beats_per_bar {
            Some(0) => Err(ConfigError::Invalid(
                "beats per bar must be at least 1".to_string(),
            )),
            Some(beats) => Ok(beats),
            None => Ok(DEFAULT_BEATS_PER_BAR),
        }
    }
}
