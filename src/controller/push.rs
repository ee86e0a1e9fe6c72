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
use super::{hardware::Layout, LedColor, Model, Pad, GRID_SIZE};

/// The bottom left pad.
const FIRST_NOTE: u8 = 36;
const LAST_NOTE: u8 = 99;

/// Ableton Push 2 in user mode. Pads are notes 36 to 99, bottom row first, and
/// colors come from the default velocity palette.
pub struct Push2;

impl Push2 {
    fn palette(color: LedColor) -> u8 {
        match color {
            LedColor::Off => 0,
            LedColor::Available => 124,
            LedColor::Modifier => 123,
            LedColor::Selected => 3,
            LedColor::SelectedBank => 125,
        }
    }
}

impl Layout for Push2 {
    fn model(&self) -> Model {
        Model::Push2
    }

    fn pad_for_note(&self, note: u8) -> Option<Pad> {
        if !(FIRST_NOTE..=LAST_NOTE).contains(&note) {
            return None;
        }
        let offset = note - FIRST_NOTE;
        Some(Pad::new(GRID_SIZE - 1 - offset / GRID_SIZE, offset % GRID_SIZE))
    }

    fn note_for_pad(&self, pad: Pad) -> u8 {
        FIRST_NOTE + (GRID_SIZE - 1 - pad.row) * GRID_SIZE + pad.col
    }

    fn led_message(&self, pad: Pad, color: LedColor) -> Vec<u8> {
        vec![0x90, self.note_for_pad(pad), Push2::palette(color)]
    }
}
