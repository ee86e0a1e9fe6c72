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
use std::{error::Error, fmt, sync::Arc};

use midly::{
    live::LiveEvent,
    num::{u4, u7},
    MidiMessage,
};
use tokio::sync::mpsc::Sender;
use tracing::{error, warn};

use crate::events::{Event, EventBus};

mod midir;
mod mock;

/// The prefix that requests a virtual output port instead of an existing one.
pub const VIRTUAL_PREFIX: &str = "virtual:";

/// A MIDI device that can send messages and listen for inputs.
pub trait Device: fmt::Display + std::marker::Send + std::marker::Sync {
    /// Returns the name of the device.
    fn name(&self) -> String;

    /// Watches MIDI input for events and sends them to the given sender.
    fn watch_events(&self, sender: Sender<Vec<u8>>) -> Result<(), Box<dyn Error>>;

    /// Stops watching events.
    fn stop_watch_events(&self);

    /// Sends a raw message to the device's output.
    fn send(&self, message: &[u8]) -> Result<(), Box<dyn Error>>;
}

/// Lists devices known to midir.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, Box<dyn Error>> {
    midir::list()
}

/// Gets a device with the given name. Names starting with `virtual:` create a
/// virtual output port with the remainder of the name.
pub fn get_device(name: &str) -> Result<Arc<dyn Device>, Box<dyn Error>> {
    if name.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(name)));
    };

    if let Some(port_name) = name.strip_prefix(VIRTUAL_PREFIX) {
        return Ok(Arc::new(midir::create_virtual(port_name)?));
    }

    Ok(Arc::new(midir::get(name)?))
}

/// Builds a Control Change event. The channel is 1-based.
pub fn control_change(
    channel: u8,
    controller: u8,
    value: u8,
) -> Result<LiveEvent<'static>, crate::Error> {
    let midi_channel = channel
        .checked_sub(1)
        .and_then(u4::try_from)
        .ok_or_else(|| crate::Error::out_of_range("channel", usize::from(channel), 16))?;
    let controller = u7::try_from(controller)
        .ok_or_else(|| crate::Error::out_of_range("cc", usize::from(controller), 128))?;
    let value = u7::try_from(value)
        .ok_or_else(|| crate::Error::out_of_range("value", usize::from(value), 128))?;

    Ok(LiveEvent::Midi {
        channel: midi_channel,
        message: MidiMessage::Controller { controller, value },
    })
}

/// Sends a message, retrying once. A second failure is published on the bus
/// as a hardware error.
pub(crate) fn send_with_retry(
    device: &dyn Device,
    message: &[u8],
    bus: &EventBus,
) -> Result<(), crate::Error> {
    let first = match device.send(message) {
        Ok(()) => return Ok(()),
        Err(e) => e.to_string(),
    };
    warn!(
        device = device.name(),
        err = first,
        "Error sending MIDI message, retrying."
    );

    if let Err(e) = device.send(message) {
        let message = e.to_string();
        error!(
            device = device.name(),
            err = message,
            "Error sending MIDI message."
        );
        if let Err(e) = bus.publish(Event::HardwareError {
            device: device.name(),
            message: message.clone(),
        }) {
            warn!(err = e.to_string(), "Unable to publish hardware error.");
        }
        return Err(crate::Error::HardwareIo(message));
    }

    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_change() {
        let mut buf = Vec::new();
        control_change(1, 74, 100)
            .expect("valid control change")
            .write(&mut buf)
            .expect("write");
        assert_eq!(vec![0xB0, 74, 100], buf);

        buf.clear();
        control_change(16, 0, 0)
            .expect("valid control change")
            .write(&mut buf)
            .expect("write");
        assert_eq!(vec![0xBF, 0, 0], buf);

        assert!(control_change(0, 1, 1).is_err());
        assert!(control_change(17, 1, 1).is_err());
        assert!(control_change(1, 128, 1).is_err());
        assert!(control_change(1, 1, 128).is_err());
    }

    #[test]
    fn test_send_with_retry() {
        let bus = EventBus::new(8);
        let mut subscription = bus.subscribe("test");
        let device = test::Device::get("mock-retry");

        // A single failure is hidden by the retry.
        device.fail_next(1);
        assert!(send_with_retry(&device, &[0x90, 1, 1], &bus).is_ok());
        assert_eq!(vec![vec![0x90, 1, 1]], device.sent());
        assert_eq!(Ok(None), subscription.try_recv());

        // Two failures surface as a hardware error.
        device.fail_next(2);
        assert_eq!(
            Err(crate::Error::HardwareIo("mock failure".to_string())),
            send_with_retry(&device, &[0x90, 2, 2], &bus)
        );
        assert_eq!(
            Ok(Some(Event::HardwareError {
                device: "mock-retry".to_string(),
                message: "mock failure".to_string(),
            })),
            subscription.try_recv()
        );
        assert_eq!(1, device.sent().len());
    }
}
