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
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, span, warn, Level};

use crate::{
    error::Error,
    events::EventBus,
    midi::{self, Device},
};

use super::{publish_note, LedColor, Model, Pad, PAD_COUNT};

/// The wire details of one hardware model.
pub trait Layout: Send + Sync + 'static {
    fn model(&self) -> Model;

    /// Maps an incoming note to a logical pad.
    fn pad_for_note(&self, note: u8) -> Option<Pad>;

    /// Maps a valid logical pad to the note the hardware uses for it.
    fn note_for_pad(&self, pad: Pad) -> u8;

    /// The message that lights a valid pad with the given color.
    fn led_message(&self, pad: Pad, color: LedColor) -> Vec<u8>;

    /// Messages sent once when the controller is opened.
    fn init_messages(&self) -> Vec<Vec<u8>> {
        Vec::new()
    }

    /// Messages sent when the controller is released.
    fn shutdown_messages(&self) -> Vec<Vec<u8>> {
        Vec::new()
    }
}

/// A grid controller attached over MIDI. The last color sent to each pad is
/// cached so that unchanged pads are not rewritten.
pub struct Controller<L: Layout> {
    layout: L,
    device: Arc<dyn Device>,
    bus: EventBus,
    leds: Mutex<[Option<LedColor>; PAD_COUNT]>,
}

impl<L: Layout> Controller<L> {
    /// Opens the controller and sends the model's initialization messages.
    pub fn open(
        layout: L,
        device: Arc<dyn Device>,
        bus: EventBus,
    ) -> Result<Controller<L>, Error> {
        let span = span!(Level::INFO, "open controller");
        let _enter = span.enter();

        let controller = Controller {
            layout,
            device,
            bus,
            leds: Mutex::new([None; PAD_COUNT]),
        };
        for message in controller.layout.init_messages() {
            controller.send(&message)?;
        }

        info!(
            model = controller.layout.model().to_string(),
            device = controller.device.name(),
            "Controller initialized."
        );
        Ok(controller)
    }

    fn send(&self, message: &[u8]) -> Result<(), Error> {
        midi::send_with_retry(self.device.as_ref(), message, &self.bus)
    }
}

impl<L: Layout> super::GridController for Controller<L> {
    fn name(&self) -> String {
        format!("{} on {}", self.layout.model(), self.device.name())
    }

    fn model(&self) -> Model {
        self.layout.model()
    }

    fn pad_for_note(&self, note: u8) -> Option<Pad> {
        self.layout.pad_for_note(note)
    }

    fn handle_note_input(&self, note: u8, velocity: u8) -> Result<(), Error> {
        publish_note(&self.bus, self.pad_for_note(note), note, velocity)
    }

    fn set_led(&self, pad: Pad, color: LedColor) -> Result<(), Error> {
        if !pad.is_valid() {
            return Err(Error::out_of_range("pad", pad.index(), PAD_COUNT));
        }

        let mut leds = self.leds.lock();
        if leds[pad.index()] == Some(color) {
            return Ok(());
        }

        debug!(pad = pad.to_string(), color = ?color, "Setting LED.");
        self.send(&self.layout.led_message(pad, color))?;
        leds[pad.index()] = Some(color);
        Ok(())
    }

    fn invalidate(&self) {
        *self.leds.lock() = [None; PAD_COUNT];
    }

    fn device(&self) -> Option<Arc<dyn Device>> {
        Some(self.device.clone())
    }

    fn shutdown(&self) {
        for message in self.layout.shutdown_messages() {
            if let Err(e) = self.send(&message) {
                warn!(err = e.to_string(), "Unable to reset controller.");
            }
        }
        self.invalidate();
    }
}
