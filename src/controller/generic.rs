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
use parking_lot::Mutex;

use crate::{error::Error, events::EventBus};

use super::{publish_note, LedColor, Model, Pad, PAD_COUNT};

/// A controller with no hardware behind it. Note n maps to pad n and LED
/// state is only kept in memory.
pub struct Controller {
    bus: EventBus,
    leds: Mutex<[LedColor; PAD_COUNT]>,
}

impl Controller {
    pub fn new(bus: EventBus) -> Controller {
        Controller {
            bus,
            leds: Mutex::new([LedColor::Off; PAD_COUNT]),
        }
    }

    /// The color last set on the pad.
    pub fn led(&self, pad: Pad) -> LedColor {
        if !pad.is_valid() {
            return LedColor::Off;
        }
        self.leds.lock()[pad.index()]
    }
}

impl super::GridController for Controller {
    fn name(&self) -> String {
        String::from("generic")
    }

    fn model(&self) -> Model {
        Model::Generic
    }

    fn pad_for_note(&self, note: u8) -> Option<Pad> {
        Pad::from_index(usize::from(note))
    }

    fn handle_note_input(&self, note: u8, velocity: u8) -> Result<(), Error> {
        publish_note(&self.bus, self.pad_for_note(note), note, velocity)
    }

    fn set_led(&self, pad: Pad, color: LedColor) -> Result<(), Error> {
        if !pad.is_valid() {
            return Err(Error::out_of_range("pad", pad.index(), PAD_COUNT));
        }
        self.leds.lock()[pad.index()] = color;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::{
        controller::GridController,
        events::Event,
        store::Session,
    };

    use super::*;

    #[test]
    fn test_note_input() {
        let bus = EventBus::new(8);
        let mut subscription = bus.subscribe("test");
        let controller = Controller::new(bus);

        controller.handle_note_input(9, 100).expect("valid note");
        controller.handle_note_input(9, 0).expect("valid note");
        assert!(controller.handle_note_input(64, 100).is_err());

        assert_eq!(
            Ok(Some(Event::PadPressed {
                pad: Pad::new(1, 1),
                velocity: 100
            })),
            subscription.try_recv()
        );
        assert_eq!(
            Ok(Some(Event::PadReleased { pad: Pad::new(1, 1) })),
            subscription.try_recv()
        );
        assert_eq!(Ok(None), subscription.try_recv());
    }

    #[test]
    fn test_leds() {
        let controller = Controller::new(EventBus::new(8));
        controller
            .set_led(Pad::new(2, 3), LedColor::Selected)
            .expect("valid pad");
        assert_eq!(LedColor::Selected, controller.led(Pad::new(2, 3)));
        assert!(controller.set_led(Pad::new(8, 0), LedColor::Selected).is_err());

        let session = Session {
            bank: 0,
            snap: None,
            bank_count: 1,
            occupied: vec![false; 56],
            remembered: vec![None],
        };
        controller.refresh_state(&session).expect("refresh");
        assert_eq!(LedColor::SelectedBank, controller.led(Pad::new(0, 0)));
        assert_eq!(LedColor::Off, controller.led(Pad::new(2, 3)));

        controller.clear_leds().expect("clear");
        assert!(Pad::all().all(|pad| controller.led(pad) == LedColor::Off));
    }
}
