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
use std::str::FromStr;

use serde::Deserialize;

use crate::controller::Model;

use super::error::ConfigError;

/// The grid controller to drive.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Controller {
    /// The hardware model, e.g. launchpad-x. Defaults to the generic controller.
    model: Option<String>,

    /// The MIDI port the controller is attached to. Defaults to the model's usual port name.
    port: Option<String>,
}

impl Controller {
    pub fn new(model: Model, port: Option<&str>) -> Controller {
        Controller {
            model: Some(model.to_string()),
            port: port.map(str::to_string),
        }
    }

    /// Returns the controller model.
    pub fn model(&self) -> Result<Model, ConfigError> {
        match self.model.as_deref() {
            Some(model) => Model::from_str(model).map_err(ConfigError::Invalid),
            None => Ok(Model::Generic),
        }
    }

    /// Returns the port, if one was configured.
    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }
}
