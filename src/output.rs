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

use tokio::task::JoinHandle;
use tracing::{debug, info, span, warn, Level};

use crate::{
    error::Error,
    events::{Event, EventBus, Subscription},
    midi,
    store::Store,
};

/// Writes CC value events to the MIDI output device.
pub struct Output {
    device: Arc<dyn midi::Device>,
    channel: u8,
    store: Arc<Store>,
    bus: EventBus,
}

impl Output {
    /// Creates a new output. The channel is 1 to 16.
    pub fn new(
        device: Arc<dyn midi::Device>,
        channel: u8,
        store: Arc<Store>,
    ) -> Result<Output, Error> {
        // Fail early on a bad channel rather than on every send.
        midi::control_change(channel, 0, 0)?;
        let bus = store.bus().clone();
        Ok(Output {
            device,
            channel,
            store,
            bus,
        })
    }

    /// Starts sending. The output is subscribed before this returns.
    pub fn start(self) -> JoinHandle<()> {
        let subscription = self.bus.subscribe("cc output");
        tokio::spawn(async move { self.run(subscription).await })
    }

    async fn run(self, mut subscription: Subscription) {
        let span = span!(Level::INFO, "cc output");
        let _enter = span.enter();

        info!(
            device = self.device.name(),
            channel = self.channel,
            "CC output started."
        );

        loop {
            match subscription.recv().await {
                Ok(Event::CcValueChanged { param, cc, value }) => {
                    if let Err(e) = self.send(cc, value) {
                        debug!(param, cc, err = e.to_string(), "CC value not sent.");
                    }
                }
                Ok(_) => {}
                Err(Error::Lagged(_)) => self.resync(),
                Err(_) => {
                    info!("CC output closing.");
                    return;
                }
            }
        }
    }

    /// Sends a single control change. Failures are retried once and then
    /// reported on the bus.
    pub fn send(&self, cc: u8, value: u8) -> Result<(), Error> {
        let event = midi::control_change(self.channel, cc, value)?;
        let mut buf = Vec::with_capacity(3);
        event
            .write(&mut buf)
            .map_err(|e| Error::HardwareIo(e.to_string()))?;
        midi::send_with_retry(self.device.as_ref(), &buf, &self.bus)
    }

    /// Sends the whole live frame so the receiver matches the store again.
    pub fn resync(&self) {
        let cc_values = self.store.live_cc_values();
        info!(count = cc_values.len(), "Resending live frame.");
        for cc_value in cc_values {
            if let Err(e) = self.send(cc_value.cc, cc_value.value) {
                debug!(
                    param = cc_value.param,
                    err = e.to_string(),
                    "Unable to resend CC value."
                );
            }
        }
    }
}

/// Creates an output on the named port, falling back to nothing when the port
/// can't be opened.
pub fn open(port: &str, channel: u8, store: Arc<Store>) -> Option<Output> {
    let device = match midi::get_device(port) {
        Ok(device) => device,
        Err(e) => {
            warn!(
                port,
                err = e.to_string(),
                "Unable to open MIDI output, CC values will not be sent."
            );
            return None;
        }
    };
    match Output::new(device, channel, store) {
        Ok(output) => Some(output),
        Err(e) => {
            warn!(port, channel, err = e.to_string(), "Invalid MIDI output.");
            None
        }
    }
}
