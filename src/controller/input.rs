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

use midly::{live::LiveEvent, MidiMessage};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, span, warn, Level};

use crate::midi::Device;

use super::ControllerHandle;

/// Reads raw MIDI from the controller's input port and hands notes to the bound
/// controller.
pub struct Listener {
    device: Arc<dyn Device>,
    handle: JoinHandle<()>,
}

impl Listener {
    /// Starts listening on the bound controller's device. Controllers without
    /// a device have nothing to listen to.
    pub fn start(controller: ControllerHandle) -> Option<Listener> {
        let device = controller.get().device()?;
        let (midi_events_tx, mut midi_events_rx) = mpsc::channel::<Vec<u8>>(64);
        if let Err(e) = device.watch_events(midi_events_tx) {
            error!(
                device = device.name(),
                err = e.to_string(),
                "Error watching controller input."
            );
            return None;
        }

        let handle = tokio::spawn(async move {
            let span = span!(Level::INFO, "controller input");
            let _enter = span.enter();

            info!("Controller input listener started.");
            while let Some(raw_event) = midi_events_rx.recv().await {
                handle_message(&controller, &raw_event);
            }
            info!("Controller input closed.");
        });

        Some(Listener { device, handle })
    }

    /// Stops watching the device. The listener task ends once the input closes.
    pub fn stop(&self) {
        self.device.stop_watch_events();
    }

    /// Waits for the listener to finish.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            error!(err = e.to_string(), "Error waiting for the input listener.");
        }
    }
}

/// Parses one raw message and forwards note input.
pub(crate) fn handle_message(controller: &ControllerHandle, raw_event: &[u8]) {
    let event = match LiveEvent::parse(raw_event) {
        Ok(event) => event,
        Err(e) => {
            error!(err = format!("{:?}", e), "Error parsing event.");
            return;
        }
    };

    let (note, velocity) = match event {
        LiveEvent::Midi {
            message: MidiMessage::NoteOn { key, vel },
            ..
        } => (key.as_int(), vel.as_int()),
        LiveEvent::Midi {
            message: MidiMessage::NoteOff { key, .. },
            ..
        } => (key.as_int(), 0),
        _ => {
            debug!(event = format!("{:?}", event), "Ignoring controller event.");
            return;
        }
    };

    if let Err(e) = controller.get().handle_note_input(note, velocity) {
        warn!(note, velocity, err = e.to_string(), "Dropping controller input.");
    }
}
