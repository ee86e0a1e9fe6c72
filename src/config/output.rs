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

use super::error::ConfigError;

/// By default a virtual port is created for the DAW to listen on.
pub const DEFAULT_OUTPUT_PORT: &str = "virtual:Snapblaster";
const DEFAULT_CHANNEL: u8 = 1;

/// Where CC values are sent.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Output {
    /// The MIDI output port. Prefix with `virtual:` to create a virtual port.
    port: Option<String>,

    /// The MIDI channel, 1 to 16 (default: 1).
    channel: Option<u8>,
}

impl Output {
    pub fn new(port: &str, channel: u8) -> Output {
        Output {
            port: Some(port.to_string()),
            channel: Some(channel),
        }
    }

    /// Returns the output port.
    pub fn port(&self) -> &str {
        self.port.as_deref().unwrap_or(DEFAULT_OUTPUT_PORT)
    }

    /// Returns the MIDI channel.
    pub fn channel(&self) -> Result<u8, ConfigError> {
        match self.channel {
            Some(channel) if !(1..=16).contains(&channel) => Err(ConfigError::Invalid(format!(
                "output channel {} is not between 1 and 16",
                channel
            ))),
            Some(channel) => Ok(channel),
            None => Ok(DEFAULT_CHANNEL),
        }
    }
}
