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
use std::{fmt, sync::Arc, time::Duration};

use parking_lot::RwLock;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, warn};

use crate::{controller::Pad, error::Error, morph::MorphRequest};

/// The default number of events the bus will buffer per subscriber.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Everything that flows between the runtime components.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A pad went down on the grid controller.
    PadPressed { pad: Pad, velocity: u8 },

    /// A pad came back up. Releases never trigger snaps.
    PadReleased { pad: Pad },

    /// A CC value should be sent to the MIDI output.
    CcValueChanged { param: usize, cc: u8, value: u8 },

    /// A beat reported by the tempo source. Phase is the beat position within the bar.
    BeatOccurred { beat: u64, phase: f64 },

    /// A bar boundary reported by the tempo source.
    BarOccurred { bar: u64 },

    /// The tempo source changed tempo.
    TempoChanged { bpm: f64 },

    /// The tempo source was enabled or disabled.
    SyncStatusChanged { connected: bool },

    /// The session moved to the given snap.
    SnapSelected { bank: usize, snap: usize },

    /// A snap was created in an empty slot.
    SnapAdded { bank: usize, snap: usize },

    /// A snap's description or values changed outside of a parameter edit.
    SnapUpdated { bank: usize, snap: usize },

    /// A parameter value of the selected snap was edited by hand.
    ParameterEdited { param: usize, value: u8 },

    /// Parameters were added or removed.
    ParametersChanged { count: usize },

    /// The whole project was replaced.
    ProjectLoaded,

    /// Values were requested from the suggestion service.
    AiGenerationRequested { bank: usize, snap: usize },

    /// The suggestion service filled in a snap.
    AiGenerationCompleted {
        bank: usize,
        snap: usize,
        values: Vec<u8>,
    },

    /// The suggestion service failed. The reason is passed through untouched.
    AiGenerationFailed {
        bank: usize,
        snap: usize,
        reason: String,
    },

    /// A morph between two snaps was requested.
    MorphInitiated(MorphRequest),

    /// A morph frame was applied.
    MorphProgressed { progress: f64 },

    /// A morph landed on its destination snap.
    MorphCompleted { bank: usize, snap: usize },

    /// A controller or MIDI transport failed after retrying.
    HardwareError { device: String, message: String },
}

impl Event {
    /// A short name for the event, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::PadPressed { .. } => "pad_pressed",
            Event::PadReleased { .. } => "pad_released",
            Event::CcValueChanged { .. } => "cc_value_changed",
            Event::BeatOccurred { .. } => "beat_occurred",
            Event::BarOccurred { .. } => "bar_occurred",
            Event::TempoChanged { .. } => "tempo_changed",
            Event::SyncStatusChanged { .. } => "sync_status_changed",
            Event::SnapSelected { .. } => "snap_selected",
            Event::SnapAdded { .. } => "snap_added",
            Event::SnapUpdated { .. } => "snap_updated",
            Event::ParameterEdited { .. } => "parameter_edited",
            Event::ParametersChanged { .. } => "parameters_changed",
            Event::ProjectLoaded => "project_loaded",
            Event::AiGenerationRequested { .. } => "ai_generation_requested",
            Event::AiGenerationCompleted { .. } => "ai_generation_completed",
            Event::AiGenerationFailed { .. } => "ai_generation_failed",
            Event::MorphInitiated(_) => "morph_initiated",
            Event::MorphProgressed { .. } => "morph_progressed",
            Event::MorphCompleted { .. } => "morph_completed",
            Event::HardwareError { .. } => "hardware_error",
        }
    }
}

/// A broadcast bus shared by every component. Cloning the bus is cheap and all
/// clones publish into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<RwLock<Option<broadcast::Sender<Event>>>>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new bus that buffers up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> EventBus {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        EventBus {
            sender: Arc::new(RwLock::new(Some(sender))),
            capacity,
        }
    }

    /// Returns a named subscription that sees every event published from now on.
    pub fn subscribe(&self, name: &str) -> Subscription {
        let receiver = match self.sender.read().as_ref() {
            Some(sender) => sender.subscribe(),
            None => {
                // A receiver whose sender is already gone reports closed immediately.
                let (sender, receiver) = broadcast::channel(1);
                drop(sender);
                receiver
            }
        };

        Subscription {
            name: name.to_string(),
            receiver,
        }
    }

    /// Publishes an event and returns the number of subscribers that will see it.
    /// Slow subscribers never block this call.
    pub fn publish(&self, event: Event) -> Result<usize, Error> {
        let sender = self.sender.read();
        let sender = sender.as_ref().ok_or(Error::ChannelClosed)?;
        let kind = event.kind();
        match sender.send(event) {
            Ok(receivers) => Ok(receivers),
            Err(_) => {
                debug!(event = kind, "No subscribers for event.");
                Ok(0)
            }
        }
    }

    /// The number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.sender
            .read()
            .as_ref()
            .map_or(0, |sender| sender.receiver_count())
    }

    /// The capacity the bus was created with.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Closes the bus. Subscribers drain what they have and then see `ChannelClosed`.
    pub fn close(&self) {
        self.sender.write().take();
    }
}

impl Default for EventBus {
    fn default() -> EventBus {
        EventBus::new(DEFAULT_CAPACITY)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// An independent receive handle on the bus.
pub struct Subscription {
    name: String,
    receiver: broadcast::Receiver<Event>,
}

impl Subscription {
    /// Waits for the next event.
    ///
    /// When this subscriber has fallen behind, `Lagged` is returned once and the
    /// subscription skips ahead so that the next call returns the next event
    /// published. Missed events are never replayed.
    pub async fn recv(&mut self) -> Result<Event, Error> {
        match self.receiver.recv().await {
            Ok(event) => Ok(event),
            Err(RecvError::Closed) => Err(Error::ChannelClosed),
            Err(RecvError::Lagged(missed)) => Err(self.lagged(missed)),
        }
    }

    /// Waits for the next event for at most `timeout`. Returns `None` on timeout.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Event>, Error> {
        match tokio::time::timeout(timeout, self.recv()).await {
            Ok(result) => result.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Returns the next event if one is already waiting.
    pub fn try_recv(&mut self) -> Result<Option<Event>, Error> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Closed) => Err(Error::ChannelClosed),
            Err(TryRecvError::Lagged(missed)) => Err(self.lagged(missed)),
        }
    }

    /// The name given at subscription time.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn lagged(&mut self, missed: u64) -> Error {
        warn!(
            subscriber = self.name,
            missed, "Subscriber lagged behind the event bus."
        );
        self.receiver = self.receiver.resubscribe();
        Error::Lagged(missed)
    }
}
