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
use std::path::Path;

use config::{Config, File};
use serde::Deserialize;

use crate::{
    events::DEFAULT_CAPACITY,
    license::{License, Tier},
    morph::Settings,
};

mod clock;
mod controller;
mod error;
mod morph;
mod output;

pub use self::clock::Clock;
pub use self::controller::Controller;
pub use self::error::ConfigError;
pub use self::morph::Morph;
pub use self::output::{Output, DEFAULT_OUTPUT_PORT};

/// The top level runtime configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Snapblaster {
    /// The license tier (default: free).
    license: Option<Tier>,

    /// Events buffered per subscriber before it is considered lagging.
    bus_capacity: Option<usize>,

    controller: Option<Controller>,
    output: Option<Output>,
    morph: Option<Morph>,
    clock: Option<Clock>,
}

impl Snapblaster {
    /// Parses the configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Snapblaster, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Snapblaster>()?)
    }

    pub fn with_controller(mut self, controller: Controller) -> Snapblaster {
        self.controller = Some(controller);
        self
    }

    pub fn with_output(mut self, output: Output) -> Snapblaster {
        self.output = Some(output);
        self
    }

    pub fn license(&self) -> License {
        License::new(self.license.unwrap_or_default())
    }

    pub fn bus_capacity(&self) -> Result<usize, ConfigError> {
        match self.bus_capacity {
            Some(0) => Err(ConfigError::Invalid(
                "bus capacity must be at least 1".to_string(),
            )),
            Some(capacity) => Ok(capacity),
            None => Ok(DEFAULT_CAPACITY),
        }
    }

    pub fn controller(&self) -> Controller {
        self.controller.clone().unwrap_or_default()
    }

    pub fn output(&self) -> Output {
        self.output.clone().unwrap_or_default()
    }

    pub fn clock(&self) -> Clock {
        self.clock.clone().unwrap_or_default()
    }

    /// Returns the morph settings, using the clock's bar length.
    pub fn morph_settings(&self) -> Result<Settings, ConfigError> {
        let settings = self
            .morph
            .clone()
            .unwrap_or_default()
            .settings(self.clock().beats_per_bar()?)?;
        if !self.license().allows_curve(settings.default_curve) {
            return Err(ConfigError::Invalid(format!(
                "the {} curve requires the pro license",
                settings.default_curve
            )));
        }
        Ok(settings)
    }
}
