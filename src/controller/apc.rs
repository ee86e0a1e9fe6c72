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
use super::{hardware::Layout, LedColor, Model, Pad, GRID_SIZE, PAD_COUNT};

const OFF: u8 = 0;
const GREEN: u8 = 1;
const RED: u8 = 3;
const YELLOW: u8 = 5;
const YELLOW_BLINK: u8 = 6;

/// Akai APC Mini. Pads are notes 0 to 63, bottom row first.
pub struct ApcMini;

impl Layout for ApcMini {
    fn model(&self) -> Model {
        Model::ApcMini
    }

    fn pad_for_note(&self, note: u8) -> Option<Pad> {
        if usize::from(note) >= PAD_COUNT {
            return None;
        }
        Some(Pad::new(GRID_SIZE - 1 - note / GRID_SIZE, note % GRID_SIZE))
    }

    fn note_for_pad(&self, pad: Pad) -> u8 {
        (GRID_SIZE - 1 - pad.row) * GRID_SIZE + pad.col
    }

    fn led_message(&self, pad: Pad, color: LedColor) -> Vec<u8> {
        let velocity = match color {
            LedColor::Off => OFF,
            LedColor::Available => YELLOW,
            LedColor::Selected => YELLOW_BLINK,
            LedColor::Modifier => RED,
            LedColor::SelectedBank => GREEN,
        };
        vec![0x90, self.note_for_pad(pad), velocity]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_layout() {
        assert_eq!(Some(Pad::new(0, 0)), ApcMini.pad_for_note(56));
        assert_eq!(Some(Pad::new(0, 7)), ApcMini.pad_for_note(63));
        assert_eq!(Some(Pad::new(7, 0)), ApcMini.pad_for_note(0));
        // The round buttons around the grid are ignored.
        assert_eq!(None, ApcMini.pad_for_note(64));
        assert_eq!(None, ApcMini.pad_for_note(98));
        for pad in Pad::all() {
            assert_eq!(Some(pad), ApcMini.pad_for_note(ApcMini.note_for_pad(pad)));
        }
    }

    #[test]
    fn test_led_message() {
        assert_eq!(
            vec![0x90, 56, 1],
            ApcMini.led_message(Pad::new(0, 0), LedColor::SelectedBank)
        );
        assert_eq!(
            vec![0x90, 8, 6],
            ApcMini.led_message(Pad::new(6, 0), LedColor::Selected)
        );
    }
}
