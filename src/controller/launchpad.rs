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

//! Novation Launchpads in programmer mode. The top left pad is note 81 and the
//! bottom right pad is note 18.

use super::{hardware::Layout, LedColor, Model, Pad, GRID_SIZE};

const SYSEX_START: u8 = 0xF0;
const SYSEX_END: u8 = 0xF7;
const NOVATION: [u8; 3] = [0x00, 0x20, 0x29];
const LAUNCHPAD_X: u8 = 0x0C;
const LAUNCHPAD_MINI_MK3: u8 = 0x0D;

const NOTE_ON: u8 = 0x90;
const STATIC_CHANNEL: u8 = 0;
const PULSING_CHANNEL: u8 = 2;

fn programmer_pad(note: u8) -> Option<Pad> {
    let row_from_bottom = note / 10;
    let col = note % 10;
    if !(1..=GRID_SIZE).contains(&row_from_bottom) || !(1..=GRID_SIZE).contains(&col) {
        return None;
    }
    Some(Pad::new(GRID_SIZE - row_from_bottom, col - 1))
}

fn programmer_note(pad: Pad) -> u8 {
    (GRID_SIZE - pad.row) * 10 + pad.col + 1
}

fn sysex(device: u8, body: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(body.len() + 7);
    message.push(SYSEX_START);
    message.extend_from_slice(&NOVATION);
    message.push(0x02);
    message.push(device);
    message.extend_from_slice(body);
    message.push(SYSEX_END);
    message
}

fn programmer_mode(device: u8, enabled: bool) -> Vec<u8> {
    sysex(device, &[0x0E, u8::from(enabled)])
}

/// The Launchpad X takes full RGB colors over SysEx.
pub struct LaunchpadX;

impl LaunchpadX {
    fn rgb(color: LedColor) -> [u8; 3] {
        match color {
            LedColor::Off => [0, 0, 0],
            LedColor::Available => [15, 15, 15],
            LedColor::Selected => [127, 82, 0],
            LedColor::Modifier => [32, 32, 32],
            LedColor::SelectedBank => [0, 0, 127],
        }
    }
}

impl Layout for LaunchpadX {
    fn model(&self) -> Model {
        Model::LaunchpadX
    }

    fn pad_for_note(&self, note: u8) -> Option<Pad> {
        programmer_pad(note)
    }

    fn note_for_pad(&self, pad: Pad) -> u8 {
        programmer_note(pad)
    }

    fn led_message(&self, pad: Pad, color: LedColor) -> Vec<u8> {
        let [r, g, b] = LaunchpadX::rgb(color);
        sysex(LAUNCHPAD_X, &[0x03, 0x03, self.note_for_pad(pad), r, g, b])
    }

    fn init_messages(&self) -> Vec<Vec<u8>> {
        vec![programmer_mode(LAUNCHPAD_X, true)]
    }

    fn shutdown_messages(&self) -> Vec<Vec<u8>> {
        vec![programmer_mode(LAUNCHPAD_X, false)]
    }
}

/// The Launchpad Mini MK3 uses the note-on velocity palette. The channel picks
/// the lighting mode.
pub struct LaunchpadMiniMk3;

impl LaunchpadMiniMk3 {
    fn palette(color: LedColor) -> u8 {
        match color {
            LedColor::Off => 0,
            LedColor::Available => 1,
            LedColor::Modifier => 2,
            LedColor::Selected => 9,
            LedColor::SelectedBank => 45,
        }
    }
}

impl Layout for LaunchpadMiniMk3 {
    fn model(&self) -> Model {
        Model::LaunchpadMiniMk3
    }

    fn pad_for_note(&self, note: u8) -> Option<Pad> {
        programmer_pad(note)
    }

    fn note_for_pad(&self, pad: Pad) -> u8 {
        programmer_note(pad)
    }

    fn led_message(&self, pad: Pad, color: LedColor) -> Vec<u8> {
        let channel = match color {
            LedColor::Selected => PULSING_CHANNEL,
            _ => STATIC_CHANNEL,
        };
        vec![
            NOTE_ON | channel,
            self.note_for_pad(pad),
            LaunchpadMiniMk3::palette(color),
        ]
    }

    fn init_messages(&self) -> Vec<Vec<u8>> {
        vec![programmer_mode(LAUNCHPAD_MINI_MK3, true)]
    }

    fn shutdown_messages(&self) -> Vec<Vec<u8>> {
        vec![programmer_mode(LAUNCHPAD_MINI_MK3, false)]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_programmer_layout() {
        assert_eq!(Some(Pad::new(0, 0)), LaunchpadX.pad_for_note(81));
        assert_eq!(Some(Pad::new(0, 7)), LaunchpadX.pad_for_note(88));
        assert_eq!(Some(Pad::new(7, 0)), LaunchpadX.pad_for_note(11));
        assert_eq!(Some(Pad::new(7, 7)), LaunchpadMiniMk3.pad_for_note(18));
        // The side buttons and out-of-grid notes are not pads.
        for note in [0, 10, 19, 89, 90, 91, 99] {
            assert_eq!(None, LaunchpadX.pad_for_note(note), "note {}", note);
        }

        for pad in Pad::all() {
            assert_eq!(
                Some(pad),
                LaunchpadX.pad_for_note(LaunchpadX.note_for_pad(pad))
            );
        }
    }

    #[test]
    fn test_launchpad_x_messages() {
        assert_eq!(
            vec![0xF0, 0x00, 0x20, 0x29, 0x02, 0x0C, 0x03, 0x03, 81, 0, 0, 127, 0xF7],
            LaunchpadX.led_message(Pad::new(0, 0), LedColor::SelectedBank)
        );
        assert_eq!(
            vec![vec![0xF0, 0x00, 0x20, 0x29, 0x02, 0x0C, 0x0E, 0x01, 0xF7]],
            LaunchpadX.init_messages()
        );
        assert_eq!(
            vec![vec![0xF0, 0x00, 0x20, 0x29, 0x02, 0x0C, 0x0E, 0x00, 0xF7]],
            LaunchpadX.shutdown_messages()
        );
    }

    #[test]
    fn test_launchpad_mini_messages() {
        assert_eq!(
            vec![0x90, 45, 1],
            LaunchpadMiniMk3.led_message(Pad::new(4, 4), LedColor::Available)
        );
        assert_eq!(
            vec![0x92, 11, 9],
            LaunchpadMiniMk3.led_message(Pad::new(7, 0), LedColor::Selected)
        );
        assert_eq!(
            vec![vec![0xF0, 0x00, 0x20, 0x29, 0x02, 0x0D, 0x0E, 0x01, 0xF7]],
            LaunchpadMiniMk3.init_messages()
        );
    }
}
