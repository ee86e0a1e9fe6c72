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
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, span, warn, Level};

use crate::{
    error::Error,
    events::{Event, EventBus, Subscription},
    license::License,
    store::Store,
};

mod curve;

pub use curve::{interpolate, MorphCurve};

/// The durations a morph may last, in bars.
pub const VALID_BARS: [u8; 5] = [1, 2, 4, 8, 16];

/// The tempo assumed until a tempo source reports one.
pub const DEFAULT_BPM: f64 = 120.0;

pub const DEFAULT_BEATS_PER_BAR: u8 = 4;

pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// A request to morph between two snaps of a bank.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MorphRequest {
    pub bank: usize,
    pub from: usize,
    pub to: usize,
    pub bars: u8,
    pub curve: MorphCurve,
    pub quantize: bool,
}

/// Why a morph stopped before landing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptReason {
    Superseded,
    ParameterEdited,
    SnapSelected,
    ProjectChanged,
    /// The store stopped accepting frames from the morph.
    StateChanged,
    FrameRejected,
    Shutdown,
}

impl fmt::Display for InterruptReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            InterruptReason::Superseded => "superseded by a new morph",
            InterruptReason::ParameterEdited => "parameter edited",
            InterruptReason::SnapSelected => "snap selected",
            InterruptReason::ProjectChanged => "project changed",
            InterruptReason::StateChanged => "live frame taken over",
            InterruptReason::FrameRejected => "frame rejected by the store",
            InterruptReason::Shutdown => "shutting down",
        };
        write!(f, "{}", reason)
    }
}

/// How a morph ended. Interruption is a normal ending with no completed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MorphOutcome {
    Completed,
    Interrupted(InterruptReason),
}

/// Morph settings shared by the engine and the trigger engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// How often wall-clock morphs produce a frame.
    pub frame_interval: Duration,
    /// The duration used for morphs started from the grid.
    pub default_bars: u8,
    /// The curve used for morphs started from the grid.
    pub default_curve: MorphCurve,
    /// Whether morphs started from the grid wait for the next bar.
    pub quantize: bool,
    pub beats_per_bar: u8,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            frame_interval: DEFAULT_FRAME_INTERVAL,
            default_bars: 1,
            default_curve: MorphCurve::Linear,
            quantize: true,
            beats_per_bar: DEFAULT_BEATS_PER_BAR,
        }
    }
}

/// How progress is measured.
#[derive(Debug)]
enum Timing {
    /// Waiting for the next bar boundary from the tempo source.
    WaitingForBar,
    /// Counting beats from the bar the morph started on.
    Beats {
        start_beat: Option<u64>,
        total_beats: f64,
    },
    /// Measuring wall-clock time.
    WallClock { started: Instant, duration: Duration },
}

struct ActiveMorph {
    id: u64,
    request: MorphRequest,
    from: Vec<u8>,
    to: Vec<u8>,
    timing: Timing,
    progress: f64,
    ticker: Option<JoinHandle<()>>,
}

impl ActiveMorph {
    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

impl Drop for ActiveMorph {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}

/// Engine state owned by the engine task.
struct EngineState {
    active: Option<ActiveMorph>,
    bpm: f64,
    sync_connected: bool,
}

/// Interpolates parameter values between two snaps over musical time.
pub struct Engine {
    store: Arc<Store>,
    bus: EventBus,
    license: License,
    settings: Settings,
}

impl Engine {
    pub fn new(store: Arc<Store>, license: License, settings: Settings) -> Engine {
        let bus = store.bus().clone();
        Engine {
            store,
            bus,
            license,
            settings,
        }
    }

    /// Checks a request against the license and the project.
    pub fn validate(&self, request: &MorphRequest) -> Result<(Vec<u8>, Vec<u8>), Error> {
        if !VALID_BARS.contains(&request.bars) {
            return Err(Error::InvalidMorph(format!(
                "{} bars is not one of {:?}",
                request.bars, VALID_BARS
            )));
        }
        if !self.license.allows_curve(request.curve) {
            return Err(Error::NotLicensed(format!(
                "{} morphs require the pro license",
                request.curve
            )));
        }

        let from = self.store.snap_values(request.bank, request.from)?;
        let to = self.store.snap_values(request.bank, request.to)?;
        Ok((from, to))
    }

    /// Starts the engine task. The engine is subscribed before this returns.
    pub fn start(self) -> JoinHandle<()> {
        let subscription = self.bus.subscribe("morph engine");
        tokio::spawn(async move { self.run(subscription).await })
    }

    async fn run(self, mut subscription: Subscription) {
        let span = span!(Level::INFO, "morph engine");
        let _enter = span.enter();

        let (ticks_tx, mut ticks_rx) = mpsc::channel::<u64>(16);
        let mut state = EngineState {
            active: None,
            bpm: DEFAULT_BPM,
            sync_connected: false,
        };

        info!("Morph engine started.");

        loop {
            tokio::select! {
                event = subscription.recv() => match event {
                    Ok(event) => self.handle_event(&mut state, event, &ticks_tx),
                    // Missed events may have taken the live frame away.
                    Err(Error::Lagged(_)) => self.resync(&mut state, InterruptReason::StateChanged),
                    Err(_) => {
                        self.interrupt(&mut state, InterruptReason::Shutdown);
                        info!("Morph engine closing.");
                        return;
                    }
                },
                Some(id) = ticks_rx.recv() => self.handle_tick(&mut state, id),
            }
        }
    }

    fn handle_event(&self, state: &mut EngineState, event: Event, ticks_tx: &mpsc::Sender<u64>) {
        match event {
            Event::MorphInitiated(request) => self.begin(state, request, ticks_tx),
            Event::TempoChanged { bpm } => state.bpm = bpm,
            Event::SyncStatusChanged { connected } => {
                state.sync_connected = connected;
                if !connected {
                    self.fall_back_to_wall_clock(state, ticks_tx);
                }
            }
            Event::BarOccurred { bar } => {
                if let Some(active) = state.active.as_mut() {
                    if matches!(active.timing, Timing::WaitingForBar) {
                        debug!(bar, id = active.id, "Quantized morph starting.");
                        active.timing = Timing::Beats {
                            start_beat: None,
                            total_beats: f64::from(active.request.bars)
                                * f64::from(self.settings.beats_per_bar),
                        };
                    }
                }
            }
            Event::BeatOccurred { beat, .. } => self.handle_beat(state, beat),
            Event::ParameterEdited { .. } => self.resync(state, InterruptReason::ParameterEdited),
            Event::SnapSelected { .. } => self.resync(state, InterruptReason::SnapSelected),
            Event::ParametersChanged { .. } | Event::ProjectLoaded => {
                self.resync(state, InterruptReason::ProjectChanged)
            }
            _ => {}
        }
    }

    fn begin(&self, state: &mut EngineState, request: MorphRequest, ticks_tx: &mpsc::Sender<u64>) {
        let (from, to) = match self.validate(&request) {
            Ok(values) => values,
            Err(e) => {
                warn!(
                    bank = request.bank,
                    from = request.from,
                    to = request.to,
                    err = e.to_string(),
                    "Rejecting morph request."
                );
                return;
            }
        };

        self.interrupt(state, InterruptReason::Superseded);

        let id = self.store.begin_morph();

        let quantized = request.quantize && state.sync_connected;
        let mut active = ActiveMorph {
            id,
            request,
            from,
            to,
            timing: Timing::WaitingForBar,
            progress: 0.0,
            ticker: None,
        };
        if !quantized {
            self.start_wall_clock(&mut active, state.bpm, ticks_tx);
        }

        info!(
            id,
            bank = request.bank,
            from = request.from,
            to = request.to,
            bars = request.bars,
            curve = request.curve.to_string(),
            quantized,
            "Morph started."
        );
        state.active = Some(active);
    }

    /// The wall-clock length of the morph at the given tempo.
    fn duration(&self, request: &MorphRequest, bpm: f64) -> Duration {
        let beats = f64::from(request.bars) * f64::from(self.settings.beats_per_bar);
        Duration::from_secs_f64(beats * 60.0 / bpm.max(1.0))
    }

    fn start_wall_clock(&self, active: &mut ActiveMorph, bpm: f64, ticks_tx: &mpsc::Sender<u64>) {
        let duration = self.duration(&active.request, bpm);
        // Resume from the current progress when switching away from beats.
        let elapsed = duration.mul_f64(active.progress);
        active.timing = Timing::WallClock {
            started: Instant::now().checked_sub(elapsed).unwrap_or_else(Instant::now),
            duration,
        };
        active.stop_ticker();
        active.ticker = Some(spawn_ticker(
            active.id,
            self.settings.frame_interval,
            ticks_tx.clone(),
        ));
    }

    fn fall_back_to_wall_clock(&self, state: &mut EngineState, ticks_tx: &mpsc::Sender<u64>) {
        let bpm = state.bpm;
        if let Some(active) = state.active.as_mut() {
            if !matches!(active.timing, Timing::WallClock { .. }) {
                info!(id = active.id, "Tempo source lost, morph continues on wall clock.");
                self.start_wall_clock(active, bpm, ticks_tx);
            }
        }
    }

    fn handle_beat(&self, state: &mut EngineState, beat: u64) {
        let progress = match state.active.as_mut() {
            Some(ActiveMorph {
                timing:
                    Timing::Beats {
                        start_beat,
                        total_beats,
                    },
                ..
            }) => {
                let start = *start_beat.get_or_insert(beat);
                (beat.saturating_sub(start) as f64 / *total_beats).clamp(0.0, 1.0)
            }
            _ => return,
        };
        self.advance(state, progress);
    }

    fn handle_tick(&self, state: &mut EngineState, id: u64) {
        let progress = match state.active.as_ref() {
            Some(active) if active.id == id => match active.timing {
                Timing::WallClock { started, duration } => {
                    (started.elapsed().as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0)
                }
                _ => return,
            },
            _ => {
                debug!(id, "Ignoring tick from a stale morph.");
                return;
            }
        };
        self.advance(state, progress);
    }

    /// Applies the frame for the given progress, landing the morph at 1.
    fn advance(&self, state: &mut EngineState, progress: f64) {
        let Some(active) = state.active.as_mut() else {
            return;
        };

        active.progress = progress;
        let values = interpolate(&active.from, &active.to, active.request.curve, progress);

        if progress < 1.0 {
            match self.store.apply_morph_frame(active.id, &values) {
                Ok(_) => {}
                Err(Error::StaleMorph(_)) => {
                    self.interrupt(state, InterruptReason::StateChanged);
                    return;
                }
                Err(e) => {
                    warn!(id = active.id, err = e.to_string(), "Morph frame rejected.");
                    self.interrupt(state, InterruptReason::FrameRejected);
                    return;
                }
            }
            self.publish(Event::MorphProgressed { progress });
            return;
        }

        let request = active.request;
        let id = active.id;
        match self.store.complete_morph(id, request.bank, request.to, &values) {
            Ok(()) => state.active = None,
            Err(Error::StaleMorph(_)) => {
                self.interrupt(state, InterruptReason::StateChanged);
                return;
            }
            Err(e) => {
                warn!(id, err = e.to_string(), "Unable to land morph.");
                self.interrupt(state, InterruptReason::FrameRejected);
                return;
            }
        }

        self.publish(Event::MorphProgressed { progress });
        self.publish(Event::MorphCompleted {
            bank: request.bank,
            snap: request.to,
        });
        info!(id, outcome = ?MorphOutcome::Completed, "Morph ended.");
    }

    /// Drops the active morph if the store no longer accepts its frames. The
    /// store is the authority, so events that predate the morph are ignored.
    fn resync(&self, state: &mut EngineState, reason: InterruptReason) {
        let Some(active) = state.active.as_ref() else {
            return;
        };
        if self.store.active_morph() != Some(active.id) {
            self.interrupt(state, reason);
        }
    }

    /// Drops the active morph, if there is one. The store keeps the last frame.
    fn interrupt(&self, state: &mut EngineState, reason: InterruptReason) -> Option<MorphOutcome> {
        let active = state.active.take()?;
        self.store.cancel_morph(active.id);
        let outcome = MorphOutcome::Interrupted(reason);
        info!(
            id = active.id,
            progress = active.progress,
            reason = reason.to_string(),
            outcome = ?outcome,
            "Morph ended."
        );
        Some(outcome)
    }

    fn publish(&self, event: Event) {
        if let Err(e) = self.bus.publish(event) {
            debug!(err = e.to_string(), "Unable to publish morph event.");
        }
    }
}

/// Sends the morph id at a fixed interval until aborted or the engine goes away.
fn spawn_ticker(id: u64, interval: Duration, ticks_tx: mpsc::Sender<u64>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval(interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            if ticks_tx.send(id).await.is_err() {
                return;
            }
        }
    })
}
