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
use std::{collections::HashSet, sync::Arc};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, span, warn, Level};

use crate::{
    controller::{ControllerHandle, Pad},
    error::Error,
    events::{Event, EventBus, Subscription},
    morph::{MorphRequest, Settings},
    store::Store,
};

/// The trigger engine's input state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Idle,
    ModifierHeld,
}

/// Turns pad presses into snap recall, bank switching and morph requests.
pub struct Engine {
    store: Arc<Store>,
    bus: EventBus,
    controller: ControllerHandle,
    settings: Settings,
    /// Modifier pads currently held down.
    held: Mutex<HashSet<Pad>>,
}

impl Engine {
    pub fn new(store: Arc<Store>, controller: ControllerHandle, settings: Settings) -> Engine {
        let bus = store.bus().clone();
        Engine {
            store,
            bus,
            controller,
            settings,
            held: Mutex::new(HashSet::new()),
        }
    }

    pub fn mode(&self) -> Mode {
        if self.held.lock().is_empty() {
            Mode::Idle
        } else {
            Mode::ModifierHeld
        }
    }

    /// Starts processing pad events from the bus. The engine is subscribed
    /// before this returns.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        let subscription = self.bus.subscribe("trigger engine");
        tokio::spawn(async move { self.run(subscription).await })
    }

    async fn run(&self, mut subscription: Subscription) {
        let span = span!(Level::INFO, "trigger engine");
        let _enter = span.enter();

        self.refresh_leds();
        info!("Trigger engine started.");

        loop {
            match subscription.recv().await {
                Ok(event) => self.handle_event(&event),
                // Whatever was missed, the session is the truth.
                Err(Error::Lagged(_)) => self.refresh_leds(),
                Err(_) => {
                    info!("Trigger engine closing.");
                    return;
                }
            }
        }
    }

    fn handle_event(&self, event: &Event) {
        match event {
            Event::PadPressed { pad, .. } => self.press(*pad),
            Event::PadReleased { pad } => self.release(*pad),
            Event::SnapSelected { .. }
            | Event::SnapAdded { .. }
            | Event::MorphCompleted { .. }
            | Event::ProjectLoaded => self.refresh_leds(),
            _ => {}
        }
    }

    /// Handles a pad going down.
    pub fn press(&self, pad: Pad) {
        if !pad.is_valid() {
            warn!(row = pad.row, col = pad.col, "Dropping press for invalid pad.");
            return;
        }

        if pad.is_modifier() {
            self.held.lock().insert(pad);
            self.select_bank(pad);
            return;
        }

        let Some(slot) = pad.slot() else {
            warn!(%pad, "Dropping press outside the performance area.");
            return;
        };
        match self.mode() {
            Mode::Idle => self.trigger(slot),
            Mode::ModifierHeld => self.request_morph(slot),
        }
    }

    /// Handles a pad coming back up. Only modifier releases matter.
    pub fn release(&self, pad: Pad) {
        if !pad.is_modifier() {
            return;
        }
        let mut held = self.held.lock();
        held.remove(&pad);
        if held.is_empty() {
            debug!("Modifiers released.");
        }
    }

    fn select_bank(&self, pad: Pad) {
        let bank = usize::from(pad.col);
        match self.store.select_bank(bank) {
            Ok(snap) => {
                debug!(bank, snap, "Bank switched from the grid.");
                self.refresh_leds();
            }
            Err(e) => warn!(bank, err = e.to_string(), "Ignoring bank select."),
        }
    }

    /// Recalls the snap at a slot of the current bank, creating it first if
    /// the slot is empty.
    fn trigger(&self, slot: usize) {
        let bank = self.store.session().bank;
        if !self.store.is_occupied(bank, slot) {
            match self
                .store
                .add_snap(bank, slot, &format!("Snap {}", slot + 1), "")
            {
                // Another writer may have filled the slot in the meantime.
                Ok(()) | Err(Error::SlotOccupied { .. }) => {}
                Err(e) => {
                    warn!(bank, slot, err = e.to_string(), "Unable to create snap.");
                    return;
                }
            }
        }

        let cc_values = match self.store.select_snap(bank, slot) {
            Ok(cc_values) => cc_values,
            Err(e) => {
                warn!(bank, slot, err = e.to_string(), "Unable to select snap.");
                return;
            }
        };

        for cc_value in cc_values.iter() {
            self.publish(cc_value.event());
        }
        debug!(bank, slot, count = cc_values.len(), "Snap triggered.");
        self.refresh_leds();
    }

    fn request_morph(&self, slot: usize) {
        let session = self.store.session();
        let Some(from) = session.snap else {
            debug!(slot, "No snap selected to morph from.");
            return;
        };
        if from == slot {
            debug!(slot, "Ignoring morph to the selected snap.");
            return;
        }
        if !self.store.is_occupied(session.bank, slot) {
            debug!(slot, "Ignoring morph to an empty slot.");
            return;
        }

        self.publish(Event::MorphInitiated(MorphRequest {
            bank: session.bank,
            from,
            to: slot,
            bars: self.settings.default_bars,
            curve: self.settings.default_curve,
            quantize: self.settings.quantize,
        }));
    }

    /// Edits a parameter of the selected snap and sends the new value out.
    pub fn edit_parameter(&self, param: usize, value: i32) -> Result<(), Error> {
        let cc_value = self.store.edit_parameter_value(param, value)?;
        self.publish(cc_value.event());
        Ok(())
    }

    fn refresh_leds(&self) {
        let controller = self.controller.get();
        if let Err(e) = controller.refresh_state(&self.store.session()) {
            warn!(
                controller = controller.name(),
                err = e.to_string(),
                "Unable to refresh LEDs."
            );
        }
    }

    fn publish(&self, event: Event) {
        if let Err(e) = self.bus.publish(event) {
            debug!(err = e.to_string(), "Unable to publish trigger event.");
        }
    }
}

#[cfg(test)]
mod test {
    use crate::{
        controller::{generic, GridController, LedColor, Model},
        events::Subscription,
        license::License,
        morph::MorphCurve,
        project::{Parameter, Project},
        testutil::{eventually, recv_until},
    };

    use super::*;

    struct Fixture {
        store: Arc<Store>,
        bus: EventBus,
        leds: Arc<generic::Controller>,
        engine: Arc<Engine>,
    }

    fn fixture(license: License, parameters: usize) -> Fixture {
        let bus = EventBus::new(1024);
        let mut project = Project::new("Trigger", 4);
        for i in 0..parameters {
            project
                .parameters
                .push(Parameter::new(&format!("P{}", i), "", 10 + i as u8));
        }
        let store = Arc::new(Store::new(project, license, bus.clone()));
        let leds = Arc::new(generic::Controller::new(bus.clone()));
        let engine = Arc::new(Engine::new(
            store.clone(),
            ControllerHandle::new(leds.clone()),
            Settings {
                default_bars: 2,
                default_curve: MorphCurve::Linear,
                quantize: false,
                ..Default::default()
            },
        ));
        Fixture {
            store,
            bus,
            leds,
            engine,
        }
    }

    /// Records how many CC values had been published when each LED was written.
    struct LedRecorder {
        subscription: Mutex<Subscription>,
        cc_seen: Mutex<usize>,
        writes: Mutex<Vec<usize>>,
    }

    impl LedRecorder {
        fn new(bus: &EventBus) -> LedRecorder {
            LedRecorder {
                subscription: Mutex::new(bus.subscribe("led recorder")),
                cc_seen: Mutex::new(0),
                writes: Mutex::new(Vec::new()),
            }
        }

        fn reset(&self) {
            let mut subscription = self.subscription.lock();
            while subscription.try_recv().ok().flatten().is_some() {}
            *self.cc_seen.lock() = 0;
            self.writes.lock().clear();
        }
    }

    impl GridController for LedRecorder {
        fn name(&self) -> String {
            String::from("led recorder")
        }

        fn model(&self) -> Model {
            Model::Generic
        }

        fn pad_for_note(&self, note: u8) -> Option<Pad> {
            Pad::from_index(usize::from(note))
        }

        fn handle_note_input(&self, _note: u8, _velocity: u8) -> Result<(), Error> {
            Ok(())
        }

        fn set_led(&self, _pad: Pad, _color: LedColor) -> Result<(), Error> {
            let mut cc_seen = self.cc_seen.lock();
            let mut subscription = self.subscription.lock();
            while let Ok(Some(event)) = subscription.try_recv() {
                if matches!(event, Event::CcValueChanged { .. }) {
                    *cc_seen += 1;
                }
            }
            self.writes.lock().push(*cc_seen);
            Ok(())
        }
    }

    fn cc_events(events: &[Event]) -> Vec<(usize, u8)> {
        events
            .iter()
            .filter_map(|event| match event {
                Event::CcValueChanged { param, value, .. } => Some((*param, *value)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_press_empty_slot_creates_and_selects() {
        let fixture = fixture(License::free(), 3);
        let mut subscription = fixture.bus.subscribe("test");

        fixture.engine.press(Pad::new(1, 2));

        assert!(fixture.store.is_occupied(0, 2));
        assert_eq!(Some(2), fixture.store.session().snap);
        assert_eq!(vec![64, 64, 64], fixture.store.snap_values(0, 2).expect("values"));

        let mut events = Vec::new();
        while let Ok(Some(event)) = subscription.try_recv() {
            events.push(event);
        }
        assert_eq!(Some(&Event::SnapAdded { bank: 0, snap: 2 }), events.first());
        assert_eq!(vec![(0, 64), (1, 64), (2, 64)], cc_events(&events));
        assert_eq!(LedColor::Selected, fixture.leds.led(Pad::new(1, 2)));
    }

    #[test]
    fn test_leds_follow_every_cc_value() {
        let fixture = fixture(License::free(), 5);
        let recorder = Arc::new(LedRecorder::new(&fixture.bus));
        let engine = Engine::new(
            fixture.store.clone(),
            ControllerHandle::new(recorder.clone()),
            Settings::default(),
        );

        // Creating a snap and recalling a stored one both light pads last.
        for pad in [Pad::new(1, 3), Pad::new(2, 0), Pad::new(1, 3)] {
            recorder.reset();
            engine.press(pad);
            engine.release(pad);

            let writes = recorder.writes.lock().clone();
            assert!(!writes.is_empty(), "no LEDs written for {:?}", pad);
            assert!(
                writes.iter().all(|seen| *seen == 5),
                "LED written before every CC value for {:?}: {:?}",
                pad,
                writes
            );
        }
    }

    #[test]
    fn test_press_occupied_slot_sends_stored_values_in_order() {
        let fixture = fixture(License::free(), 4);
        fixture.engine.press(Pad::new(1, 0));
        for (param, value) in [(0, 1), (1, 2), (2, 3), (3, 4)] {
            fixture
                .engine
                .edit_parameter(param, value)
                .expect("edit should succeed");
        }
        fixture.engine.press(Pad::new(1, 1));

        let mut subscription = fixture.bus.subscribe("test");
        fixture.engine.press(Pad::new(1, 0));
        let mut events = Vec::new();
        while let Ok(Some(event)) = subscription.try_recv() {
            events.push(event);
        }
        assert_eq!(Some(&Event::SnapSelected { bank: 0, snap: 0 }), events.first());
        assert_eq!(vec![(0, 1), (1, 2), (2, 3), (3, 4)], cc_events(&events));

        // The previous selection goes back to available.
        assert_eq!(LedColor::Selected, fixture.leds.led(Pad::new(1, 0)));
        assert_eq!(LedColor::Available, fixture.leds.led(Pad::new(1, 1)));
    }

    #[test]
    fn test_edit_parameter_sends_single_cc() {
        let fixture = fixture(License::free(), 2);
        fixture.engine.press(Pad::new(1, 0));

        let mut subscription = fixture.bus.subscribe("test");
        fixture.engine.edit_parameter(1, 300).expect("edit");
        assert_eq!(
            Ok(Some(Event::ParameterEdited { param: 1, value: 127 })),
            subscription.try_recv()
        );
        assert_eq!(
            Ok(Some(Event::CcValueChanged {
                param: 1,
                cc: 11,
                value: 127
            })),
            subscription.try_recv()
        );
        assert_eq!(Ok(None), subscription.try_recv());

        assert!(matches!(
            fixture.engine.edit_parameter(5, 1),
            Err(Error::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_bank_select_respects_license() {
        let fixture = fixture(License::free(), 1);
        let mut subscription = fixture.bus.subscribe("test");
        let before = fixture.store.session();

        fixture.engine.press(Pad::new(0, 3));
        assert_eq!(Mode::ModifierHeld, fixture.engine.mode());
        assert_eq!(before, fixture.store.session());
        assert_eq!(Ok(None), subscription.try_recv());

        fixture.engine.release(Pad::new(0, 3));
        assert_eq!(Mode::Idle, fixture.engine.mode());
    }

    #[test]
    fn test_bank_select_remembers_snaps() {
        let fixture = fixture(License::pro(), 1);
        fixture.engine.press(Pad::new(1, 5));

        fixture.engine.press(Pad::new(0, 2));
        fixture.engine.release(Pad::new(0, 2));
        assert_eq!(2, fixture.store.session().bank);
        assert_eq!(LedColor::SelectedBank, fixture.leds.led(Pad::new(0, 2)));
        assert_eq!(LedColor::Modifier, fixture.leds.led(Pad::new(0, 0)));
        fixture.engine.press(Pad::new(1, 1));

        let mut subscription = fixture.bus.subscribe("test");
        fixture.engine.press(Pad::new(0, 0));
        fixture.engine.release(Pad::new(0, 0));
        assert_eq!(
            Ok(Some(Event::SnapSelected { bank: 0, snap: 5 })),
            subscription.try_recv()
        );
        // Bank switches never send CCs.
        assert_eq!(Ok(None), subscription.try_recv());
        assert_eq!(LedColor::Selected, fixture.leds.led(Pad::new(1, 5)));
    }

    #[test]
    fn test_modifier_press_requests_morph() {
        let fixture = fixture(License::free(), 1);
        fixture.engine.press(Pad::new(1, 0));
        fixture.engine.press(Pad::new(1, 4));

        let mut subscription = fixture.bus.subscribe("test");
        fixture.engine.press(Pad::new(0, 0));
        // Second modifier keeps the mode after the first is released.
        fixture.engine.press(Pad::new(0, 1));
        fixture.engine.release(Pad::new(0, 0));
        assert_eq!(Mode::ModifierHeld, fixture.engine.mode());

        // Empty slot and the selected snap are ignored.
        fixture.engine.press(Pad::new(1, 7));
        fixture.engine.press(Pad::new(1, 4));
        fixture.engine.press(Pad::new(1, 0));
        fixture.engine.release(Pad::new(0, 1));

        let mut events = Vec::new();
        while let Ok(Some(event)) = subscription.try_recv() {
            events.push(event);
        }
        let morphs = events
            .iter()
            .filter(|event| matches!(event, Event::MorphInitiated(_)))
            .collect::<Vec<_>>();
        assert_eq!(
            vec![&Event::MorphInitiated(MorphRequest {
                bank: 0,
                from: 4,
                to: 0,
                bars: 2,
                curve: MorphCurve::Linear,
                quantize: false,
            })],
            morphs
        );
        assert!(!fixture.store.is_occupied(0, 7));
        assert_eq!(Some(4), fixture.store.session().snap);
    }

    #[test]
    fn test_invalid_pad_is_dropped() {
        let fixture = fixture(License::free(), 1);
        let before = fixture.store.snapshot();
        fixture.engine.press(Pad::new(9, 0));
        fixture.engine.press(Pad::new(1, 8));
        assert_eq!(before, fixture.store.snapshot());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pad_events_from_bus() {
        let fixture = fixture(License::free(), 2);
        let mut subscription = fixture.bus.subscribe("test");
        let _task = fixture.engine.clone().start();

        fixture
            .bus
            .publish(Event::PadPressed {
                pad: Pad::new(2, 0),
                velocity: 100,
            })
            .expect("publish");
        fixture
            .bus
            .publish(Event::PadReleased { pad: Pad::new(2, 0) })
            .expect("publish");

        let events = recv_until(&mut subscription, |event| {
            matches!(event, Event::CcValueChanged { param: 1, .. })
        })
        .await;
        assert_eq!(vec![(0, 64), (1, 64)], cc_events(&events));

        let leds = fixture.leds.clone();
        let slot_pad = Pad::for_slot(8).expect("valid slot");
        eventually(
            move || leds.led(slot_pad) == LedColor::Selected,
            "Pad never lit as selected",
        );
    }
}
