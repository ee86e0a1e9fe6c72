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

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Instant},
};
use tracing::{debug, info, span, Level};

use crate::{
    error::Error,
    events::{Event, EventBus},
};

pub const MIN_BPM: f64 = 20.0;
pub const MAX_BPM: f64 = 999.0;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Command {
    Enable,
    Disable,
    SetTempo(f64),
}

/// Controls a running beat clock.
#[derive(Debug, Clone)]
pub struct ClockHandle {
    commands: mpsc::Sender<Command>,
}

impl ClockHandle {
    /// Starts publishing beats and reports the source as connected.
    pub async fn enable(&self) -> Result<(), Error> {
        self.send(Command::Enable).await
    }

    /// Stops publishing beats and reports the source as disconnected.
    pub async fn disable(&self) -> Result<(), Error> {
        self.send(Command::Disable).await
    }

    /// Changes the tempo. Values outside 20 to 999 BPM are clamped.
    pub async fn set_tempo(&self, bpm: f64) -> Result<(), Error> {
        self.send(Command::SetTempo(bpm)).await
    }

    async fn send(&self, command: Command) -> Result<(), Error> {
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::ChannelClosed)
    }
}

fn clamp_tempo(bpm: f64) -> f64 {
    if bpm.is_nan() {
        return crate::morph::DEFAULT_BPM;
    }
    bpm.clamp(MIN_BPM, MAX_BPM)
}

fn beat_interval(bpm: f64) -> Duration {
    Duration::from_secs_f64(60.0 / bpm)
}

/// An internal tempo source. It publishes the same beat, bar, tempo and sync
/// events an external sync source would.
struct Clock {
    bus: EventBus,
    bpm: f64,
    beats_per_bar: u8,
    beat: u64,
    last_beat: Option<Instant>,
    next_beat: Option<Instant>,
}

impl Clock {
    fn publish(&self, event: Event) -> Result<(), Error> {
        match self.bus.publish(event) {
            Ok(_) => Ok(()),
            Err(Error::ChannelClosed) => Err(Error::ChannelClosed),
            Err(e) => {
                debug!(err = e.to_string(), "Unable to publish clock event.");
                Ok(())
            }
        }
    }

    fn handle_command(&mut self, command: Command) -> Result<(), Error> {
        match command {
            Command::Enable => {
                if self.next_beat.is_none() {
                    self.beat = 0;
                    self.last_beat = None;
                    self.next_beat = Some(Instant::now());
                }
                info!(bpm = self.bpm, "Beat clock enabled.");
                self.publish(Event::SyncStatusChanged { connected: true })
            }
            Command::Disable => {
                self.next_beat = None;
                info!("Beat clock disabled.");
                self.publish(Event::SyncStatusChanged { connected: false })
            }
            Command::SetTempo(bpm) => {
                self.bpm = clamp_tempo(bpm);
                if let (Some(last), Some(_)) = (self.last_beat, self.next_beat) {
                    self.next_beat = Some(last + beat_interval(self.bpm));
                }
                info!(bpm = self.bpm, "Tempo changed.");
                self.publish(Event::TempoChanged { bpm: self.bpm })
            }
        }
    }

    /// Publishes the current beat and schedules the next one. Bars are
    /// published ahead of their first beat.
    fn tick(&mut self, now: Instant) -> Result<(), Error> {
        let beats_per_bar = u64::from(self.beats_per_bar.max(1));
        let phase = self.beat % beats_per_bar;
        if phase == 0 {
            self.publish(Event::BarOccurred {
                bar: self.beat / beats_per_bar,
            })?;
        }
        self.publish(Event::BeatOccurred {
            beat: self.beat,
            phase: phase as f64,
        })?;

        self.beat += 1;
        self.last_beat = Some(now);
        self.next_beat = Some(now + beat_interval(self.bpm));
        Ok(())
    }
}

/// Starts the beat clock. The clock stops when every handle is dropped or the
/// bus closes.
pub fn start(
    bus: EventBus,
    bpm: f64,
    beats_per_bar: u8,
    enabled: bool,
) -> (ClockHandle, JoinHandle<()>) {
    let (commands_tx, mut commands_rx) = mpsc::channel(16);
    let mut clock = Clock {
        bus,
        bpm: clamp_tempo(bpm),
        beats_per_bar,
        beat: 0,
        last_beat: None,
        next_beat: None,
    };

    let join = tokio::spawn(async move {
        let span = span!(Level::INFO, "beat clock");
        let _enter = span.enter();

        let bpm = clock.bpm;
        if clock.publish(Event::TempoChanged { bpm }).is_err() {
            return;
        }
        if enabled && clock.handle_command(Command::Enable).is_err() {
            return;
        }

        loop {
            let next_beat = clock.next_beat;
            let result = tokio::select! {
                command = commands_rx.recv() => match command {
                    Some(command) => clock.handle_command(command),
                    None => {
                        info!("Beat clock closing.");
                        return;
                    }
                },
                _ = time::sleep_until(next_beat.unwrap_or_else(Instant::now)), if next_beat.is_some() => {
                    clock.tick(Instant::now())
                }
            };
            if result.is_err() {
                info!("Event bus closed, beat clock stopping.");
                return;
            }
        }
    });

    (
        ClockHandle {
            commands: commands_tx,
        },
        join,
    )
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use crate::testutil::recv_until;

    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_beats_and_bars() {
        let bus = EventBus::new(256);
        let mut subscription = bus.subscribe("test");
        let (_handle, _join) = start(bus.clone(), 960.0, 4, true);

        let events = recv_until(&mut subscription, |event| {
            matches!(event, Event::BarOccurred { bar: 1 })
        })
        .await;
        assert_eq!(
            vec![
                Event::TempoChanged { bpm: 960.0 },
                Event::SyncStatusChanged { connected: true },
                Event::BarOccurred { bar: 0 },
                Event::BeatOccurred { beat: 0, phase: 0.0 },
                Event::BeatOccurred { beat: 1, phase: 1.0 },
                Event::BeatOccurred { beat: 2, phase: 2.0 },
                Event::BeatOccurred { beat: 3, phase: 3.0 },
                Event::BarOccurred { bar: 1 },
            ],
            events
        );
        assert_eq!(
            Ok(Event::BeatOccurred { beat: 4, phase: 0.0 }),
            subscription.recv().await
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_commands() {
        let bus = EventBus::new(256);
        let mut subscription = bus.subscribe("test");
        let (handle, _join) = start(bus.clone(), 5.0, 4, false);
        assert_eq!(
            Ok(Event::TempoChanged { bpm: MIN_BPM }),
            subscription.recv().await
        );

        handle.set_tempo(5000.0).await.expect("set tempo");
        assert_eq!(
            Ok(Event::TempoChanged { bpm: MAX_BPM }),
            subscription.recv().await
        );

        handle.enable().await.expect("enable");
        recv_until(&mut subscription, |event| {
            matches!(event, Event::BeatOccurred { beat: 2, .. })
        })
        .await;

        handle.disable().await.expect("disable");
        recv_until(&mut subscription, |event| {
            *event == Event::SyncStatusChanged { connected: false }
        })
        .await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        while let Ok(Some(event)) = subscription.try_recv() {
            assert!(
                !matches!(event, Event::BeatOccurred { .. }),
                "beat after disable: {:?}",
                event
            );
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stops_with_bus() {
        let bus = EventBus::new(16);
        let (handle, join) = start(bus.clone(), 120.0, 4, false);
        bus.close();

        // The clock notices the closed bus on its next publish at the latest.
        let _ = handle.enable().await;
        join.await.expect("clock task should finish");
        assert_eq!(Err(Error::ChannelClosed), handle.enable().await);
    }
}
