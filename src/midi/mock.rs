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
use std::{
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use tokio::sync::mpsc::Sender;
use tracing::debug;

/// A mock device. Records everything sent to it.
#[derive(Clone)]
pub struct Device {
    name: String,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    watcher: Arc<Mutex<Option<Sender<Vec<u8>>>>>,
    failures: Arc<AtomicUsize>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str) -> Device {
        Device {
            name: name.to_string(),
            sent: Arc::new(Mutex::new(Vec::new())),
            watcher: Arc::new(Mutex::new(None)),
            failures: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[cfg(test)]
    /// Sends the mock event through to the watcher, as if it came from hardware.
    pub fn mock_event(&self, event: &[u8]) {
        let watcher = self.watcher.lock();
        let watcher = watcher.as_ref().expect("device is not being watched");
        watcher
            .try_send(event.to_vec())
            .expect("unable to send mock event");
    }

    #[cfg(test)]
    /// Returns true if something is watching the device.
    pub fn is_watched(&self) -> bool {
        self.watcher.lock().is_some()
    }

    #[cfg(test)]
    /// Gets every message sent so far.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    #[cfg(test)]
    /// Forgets the sent messages.
    pub fn clear_sent(&self) {
        self.sent.lock().clear();
    }

    #[cfg(test)]
    /// Makes the next `count` sends fail.
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::Relaxed);
    }
}

impl super::Device for Device {
    fn name(&self) -> String {
        self.name.clone()
    }

    /// Watches MIDI input for events and sends them to the given sender.
    fn watch_events(&self, sender: Sender<Vec<u8>>) -> Result<(), Box<dyn Error>> {
        let mut watcher = self.watcher.lock();
        if watcher.is_some() {
            return Err("Already watching events.".into());
        }
        *watcher = Some(sender);
        Ok(())
    }

    /// Stops watching events. Dropping the sender closes the receiving side.
    fn stop_watch_events(&self) {
        self.watcher.lock().take();
    }

    fn send(&self, message: &[u8]) -> Result<(), Box<dyn Error>> {
        let failed = self
            .failures
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok();
        if failed {
            return Err("mock failure".into());
        }

        debug!(device = self.name, message = ?message, "Mock device sent message.");
        self.sent.lock().push(message.to_vec());
        Ok(())
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name,)
    }
}
