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
use std::time::Duration;

use duration_string::DurationString;
use serde::Deserialize;

use crate::morph::{MorphCurve, Settings, DEFAULT_FRAME_INTERVAL, VALID_BARS};

use super::error::ConfigError;

/// Defaults for morphs started from the grid.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Morph {
    /// How often wall-clock morphs produce a frame, e.g. 33ms.
    frame_interval: Option<String>,

    /// The morph length in bars: 1, 2, 4, 8 or 16 (default: 1).
    bars: Option<u8>,

    /// The morph curve (default: linear).
    curve: Option<MorphCurve>,

    /// Wait for the next bar when a tempo source is running (default: true).
    quantize: Option<bool>,
}

impl Morph {
    /// Returns the frame interval.
    pub fn frame_interval(&self) -> Result<Duration, ConfigError> {
        let interval = match &self.frame_interval {
            Some(interval) => DurationString::from_string(interval.clone())
                .map_err(|e| {
                    ConfigError::Invalid(format!("frame interval {}: {}", interval, e))
                })?
                .into(),
            None => DEFAULT_FRAME_INTERVAL,
        };
        if interval.is_zero() {
            return Err(ConfigError::Invalid(
                "frame interval must be greater than zero".to_string(),
            ));
        }
        Ok(interval)
    }

    /// Builds the morph settings.
    pub fn settings(&self, beats_per_bar: u8) -> Result<Settings, ConfigError> {
        let defaults = Settings::default();
        let default_bars = self.bars.unwrap_or(defaults.default_bars);
        if !VALID_BARS.contains(&default_bars) {
            return Err(ConfigError::Invalid(format!(
                "{} bars is not one of {:?}",
                default_bars, VALID_BARS
            )));
        }

        Ok(Settings {
            frame_interval: self.frame_interval()?,
            default_bars,
            default_curve: self.curve.unwrap_or(defaults.default_curve),
            quantize: self.quantize.unwrap_or(defaults.quantize),
            beats_per_bar,
        })
    }
}
