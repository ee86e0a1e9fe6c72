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
use std::{fmt, str::FromStr, sync::Arc};

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::{
    error::Error,
    events::{Event, EventBus},
    midi,
    project::SLOTS_PER_BANK,
    store::Session,
};

pub mod apc;
pub mod generic;
pub mod hardware;
pub mod input;
pub mod launchpad;
pub mod push;

/// The grid is 8 pads on each side.
pub const GRID_SIZE: u8 = 8;

/// The number of pads on the grid.
pub const PAD_COUNT: usize = (GRID_SIZE as usize) * (GRID_SIZE as usize);

/// Row 0 is reserved for bank selection.
pub const MODIFIER_ROW: u8 = 0;

/// A logical pad coordinate. Row 0 is the top of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pad {
    pub row: u8,
    pub col: u8,
}

impl Pad {
    pub fn new(row: u8, col: u8) -> Pad {
        Pad { row, col }
    }

    /// Creates a pad from a row-major index.
    pub fn from_index(index: usize) -> Option<Pad> {
        if index >= PAD_COUNT {
            return None;
        }
        let size = GRID_SIZE as usize;
        Some(Pad::new((index / size) as u8, (index % size) as u8))
    }

    /// The pad for the given snap slot in the performance area.
    pub fn for_slot(slot: usize) -> Option<Pad> {
        if slot >= SLOTS_PER_BANK {
            return None;
        }
        Pad::from_index(slot + GRID_SIZE as usize)
    }

    /// The row-major index of the pad.
    pub fn index(&self) -> usize {
        usize::from(self.row) * usize::from(GRID_SIZE) + usize::from(self.col)
    }

    pub fn is_valid(&self) -> bool {
        self.row < GRID_SIZE && self.col < GRID_SIZE
    }

    pub fn is_modifier(&self) -> bool {
        self.row == MODIFIER_ROW
    }

    /// The snap slot this pad triggers. Modifier pads have no slot.
    pub fn slot(&self) -> Option<usize> {
        if !self.is_valid() || self.is_modifier() {
            return None;
        }
        Some(self.index() - usize::from(GRID_SIZE))
    }

    /// Every pad on the grid in row-major order.
    pub fn all() -> impl Iterator<Item = Pad> {
        (0..PAD_COUNT).filter_map(Pad::from_index)
    }
}

impl fmt::Display for Pad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// The semantic LED colors. Each model maps these to its own palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LedColor {
    #[default]
    Off,
    /// A slot that holds a snap.
    Available,
    /// The selected snap.
    Selected,
    /// A bank that can be selected.
    Modifier,
    /// The current bank.
    SelectedBank,
}

impl LedColor {
    /// The color a pad should show for the given session.
    pub fn for_pad(session: &Session, pad: Pad) -> LedColor {
        if pad.is_modifier() {
            let bank = usize::from(pad.col);
            return if bank == session.bank {
                LedColor::SelectedBank
            } else if bank < session.bank_count {
                LedColor::Modifier
            } else {
                LedColor::Off
            };
        }

        match pad.slot() {
            Some(slot) if session.snap == Some(slot) => LedColor::Selected,
            Some(slot) if session.occupied.get(slot).copied().unwrap_or(false) => {
                LedColor::Available
            }
            _ => LedColor::Off,
        }
    }
}

/// The supported hardware models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    LaunchpadX,
    LaunchpadMiniMk3,
    Push2,
    ApcMini,
    Generic,
}

impl Model {
    pub const ALL: [Model; 5] = [
        Model::LaunchpadX,
        Model::LaunchpadMiniMk3,
        Model::Push2,
        Model::ApcMini,
        Model::Generic,
    ];

    /// The MIDI port name the model usually shows up as.
    pub fn default_port(&self) -> &'static str {
        match self {
            Model::LaunchpadX => "Launchpad X",
            Model::LaunchpadMiniMk3 => "Launchpad Mini MK3",
            Model::Push2 => "Ableton Push 2",
            Model::ApcMini => "APC MINI",
            Model::Generic => "generic",
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Model::LaunchpadX => "launchpad-x",
            Model::LaunchpadMiniMk3 => "launchpad-mini-mk3",
            Model::Push2 => "push-2",
            Model::ApcMini => "apc-mini",
            Model::Generic => "generic",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Model {
    type Err = String;

    fn from_str(s: &str) -> Result<Model, String> {
        let normalized = s.to_lowercase().replace([' ', '_'], "-");
        match normalized.as_str() {
            "launchpad-x" => Ok(Model::LaunchpadX),
            "launchpad-mini" | "launchpad-mini-mk3" => Ok(Model::LaunchpadMiniMk3),
            "push-2" | "push2" => Ok(Model::Push2),
            "apc-mini" => Ok(Model::ApcMini),
            "generic" | "none" => Ok(Model::Generic),
            _ => Err(format!("unsupported controller model {}", s)),
        }
    }
}

/// A grid controller. Implementations translate between raw MIDI notes and
/// logical pads, and between semantic colors and the model's LED messages.
pub trait GridController: Send + Sync {
    /// The name of the controller for logs.
    fn name(&self) -> String;

    fn model(&self) -> Model;

    /// Maps a raw note to a logical pad.
    fn pad_for_note(&self, note: u8) -> Option<Pad>;

    /// Translates a raw note into a pad event on the bus. Velocity 0 is a release.
    fn handle_note_input(&self, note: u8, velocity: u8) -> Result<(), Error>;

    /// Lights a single pad.
    fn set_led(&self, pad: Pad, color: LedColor) -> Result<(), Error>;

    /// Turns every pad off.
    fn clear_leds(&self) -> Result<(), Error> {
        for pad in Pad::all() {
            self.set_led(pad, LedColor::Off)?;
        }
        Ok(())
    }

    /// Re-renders the whole grid from the session.
    fn refresh_state(&self, session: &Session) -> Result<(), Error> {
        for pad in Pad::all() {
            self.set_led(pad, LedColor::for_pad(session, pad))?;
        }
        Ok(())
    }

    /// Forgets what the hardware is showing so the next refresh rewrites every pad.
    fn invalidate(&self) {}

    /// The MIDI device the controller's input arrives on, if any.
    fn device(&self) -> Option<Arc<dyn midi::Device>> {
        None
    }

    /// Returns the hardware to its default state.
    fn shutdown(&self) {}
}

/// Publishes the pad event for a raw note.
pub(crate) fn publish_note(
    bus: &EventBus,
    pad: Option<Pad>,
    note: u8,
    velocity: u8,
) -> Result<(), Error> {
    let pad = pad.ok_or_else(|| Error::out_of_range("note", usize::from(note), PAD_COUNT))?;
    let event = if velocity == 0 {
        Event::PadReleased { pad }
    } else {
        Event::PadPressed { pad, velocity }
    };
    bus.publish(event).map(|_| ())
}

/// A swappable reference to the active controller. Everything that talks to the
/// controller goes through the handle, so rebinding takes effect immediately.
#[derive(Clone)]
pub struct ControllerHandle {
    controller: Arc<RwLock<Arc<dyn GridController>>>,
}

impl ControllerHandle {
    pub fn new(controller: Arc<dyn GridController>) -> ControllerHandle {
        ControllerHandle {
            controller: Arc::new(RwLock::new(controller)),
        }
    }

    /// The active controller.
    pub fn get(&self) -> Arc<dyn GridController> {
        self.controller.read().clone()
    }

    /// Swaps in a new controller and returns the previous one.
    pub fn rebind(&self, controller: Arc<dyn GridController>) -> Arc<dyn GridController> {
        let previous = {
            let mut current = self.controller.write();
            std::mem::replace(&mut *current, controller)
        };
        info!(
            previous = previous.name(),
            current = self.get().name(),
            "Controller rebound."
        );
        previous
    }
}

/// Creates the controller for the given model. When the hardware can't be
/// opened, the generic controller is used so the runtime still works.
pub fn create(model: Model, device_name: Option<&str>, bus: EventBus) -> Arc<dyn GridController> {
    if model == Model::Generic {
        return Arc::new(generic::Controller::new(bus));
    }

    let device_name = device_name.unwrap_or(model.default_port()).to_string();
    let result = midi::get_device(&device_name).and_then(|device| {
        let controller: Arc<dyn GridController> = match model {
            Model::LaunchpadX => Arc::new(hardware::Controller::open(
                launchpad::LaunchpadX,
                device,
                bus.clone(),
            )?),
            Model::LaunchpadMiniMk3 => Arc::new(hardware::Controller::open(
                launchpad::LaunchpadMiniMk3,
                device,
                bus.clone(),
            )?),
            Model::Push2 => Arc::new(hardware::Controller::open(
                push::Push2,
                device,
                bus.clone(),
            )?),
            Model::ApcMini => Arc::new(hardware::Controller::open(
                apc::ApcMini,
                device,
                bus.clone(),
            )?),
            Model::Generic => Arc::new(generic::Controller::new(bus.clone())),
        };
        Ok(controller)
    });

    match result {
        Ok(controller) => {
            info!(controller = controller.name(), "Controller opened.");
            controller
        }
        Err(e) => {
            warn!(
                model = model.to_string(),
                device = device_name,
                err = e.to_string(),
                "Unable to open controller, falling back to the generic controller."
            );
            Arc::new(generic::Controller::new(bus))
        }
    }
}
