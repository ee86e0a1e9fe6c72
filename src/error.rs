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

/// Errors surfaced by the live-performance runtime. None of these are fatal:
/// callers log them and carry on with the previous state.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("{what} index {index} is out of range (limit {len})")]
    OutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("bank {bank} slot {slot} is empty")]
    EmptySlot { bank: usize, slot: usize },

    #[error("bank {bank} slot {slot} already holds a snap")]
    SlotOccupied { bank: usize, slot: usize },

    #[error("project already has the maximum of {0} parameters")]
    ParameterLimit(usize),

    #[error("not available with the current license: {0}")]
    NotLicensed(String),

    #[error("invalid morph request: {0}")]
    InvalidMorph(String),

    #[error("morph {0} is no longer active")]
    StaleMorph(u64),

    #[error("event bus closed")]
    ChannelClosed,

    #[error("subscriber lagged behind by {0} events")]
    Lagged(u64),

    #[error("hardware I/O error: {0}")]
    HardwareIo(String),
}

impl Error {
    pub(crate) fn out_of_range(what: &'static str, index: usize, len: usize) -> Error {
        Error::OutOfRange { what, index, len }
    }
}
