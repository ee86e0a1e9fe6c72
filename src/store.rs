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
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::{
    error::Error,
    events::{Event, EventBus},
    license::License,
    project::{
        Bank, Parameter, Project, Snap, DEFAULT_VALUE, MAX_PARAMETERS, MAX_VALUE, SLOTS_PER_BANK,
    },
};

/// A CC value ready for output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CcValue {
    pub param: usize,
    pub cc: u8,
    pub value: u8,
}

impl CcValue {
    pub fn event(&self) -> Event {
        Event::CcValueChanged {
            param: self.param,
            cc: self.cc,
            value: self.value,
        }
    }
}

/// A read-only view of the controller session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Session {
    /// The current bank.
    pub bank: usize,
    /// The selected snap in the current bank, if that slot holds one.
    pub snap: Option<usize>,
    /// The number of banks the performer can address.
    pub bank_count: usize,
    /// Which slots of the current bank hold a snap.
    pub occupied: Vec<bool>,
    /// The last selected snap of every bank.
    pub remembered: Vec<Option<usize>>,
}

struct State {
    project: Project,
    bank: usize,
    snap: Option<usize>,
    remembered: Vec<Option<usize>>,
    live: Vec<u8>,
    /// The morph allowed to write frames. Cleared by anything that takes the
    /// live frame away from the morph.
    morph: Option<u64>,
}

impl State {
    fn new(project: Project) -> State {
        let remembered = vec![None; project.banks.len()];
        let live = vec![DEFAULT_VALUE; project.parameters.len()];
        State {
            project,
            bank: 0,
            snap: None,
            remembered,
            live,
            morph: None,
        }
    }

    fn bank(&self, bank: usize) -> Result<&Bank, Error> {
        let len = self.project.banks.len();
        self.project
            .banks
            .get(bank)
            .ok_or_else(|| Error::out_of_range("bank", bank, len))
    }

    fn bank_mut(&mut self, bank: usize) -> Result<&mut Bank, Error> {
        let len = self.project.banks.len();
        self.project
            .banks
            .get_mut(bank)
            .ok_or_else(|| Error::out_of_range("bank", bank, len))
    }

    fn snap(&self, bank: usize, slot: usize) -> Result<&Snap, Error> {
        check_slot(slot)?;
        self.bank(bank)?
            .snap(slot)
            .ok_or(Error::EmptySlot { bank, slot })
    }

    fn snap_mut(&mut self, bank: usize, slot: usize) -> Result<&mut Snap, Error> {
        check_slot(slot)?;
        self.bank_mut(bank)?
            .snap_mut(slot)
            .ok_or(Error::EmptySlot { bank, slot })
    }

    fn empty_slot_mut(&mut self, bank: usize, slot: usize) -> Result<&mut Option<Snap>, Error> {
        check_slot(slot)?;
        let entry = self
            .bank_mut(bank)?
            .slot_mut(slot)
            .ok_or_else(|| Error::out_of_range("slot", slot, SLOTS_PER_BANK))?;
        if entry.is_some() {
            return Err(Error::SlotOccupied { bank, slot });
        }
        Ok(entry)
    }

    fn cc_values(&self, values: &[u8]) -> Vec<CcValue> {
        self.project
            .parameters
            .iter()
            .zip(values.iter())
            .enumerate()
            .map(|(param, (parameter, &value))| CcValue {
                param,
                cc: parameter.cc,
                value,
            })
            .collect()
    }

    fn check_frame(&self, values: &[u8]) -> Result<(), Error> {
        let count = self.project.parameters.len();
        if values.len() != count {
            return Err(Error::out_of_range("frame length", values.len(), count));
        }
        Ok(())
    }

    /// Writes the frame into the live values. Returns the values that changed
    /// in ascending parameter order.
    fn apply_live(&mut self, values: &[u8]) -> Vec<CcValue> {
        let mut changed = Vec::new();
        for (param, &value) in values.iter().enumerate() {
            let value = value.min(MAX_VALUE);
            if let Some(live) = self.live.get_mut(param) {
                if *live != value {
                    *live = value;
                    changed.push(CcValue {
                        param,
                        cc: self.project.parameters[param].cc,
                        value,
                    });
                }
            }
        }
        changed
    }

    /// Fails unless the given morph is still the active one.
    fn check_morph(&self, id: u64) -> Result<(), Error> {
        if self.morph != Some(id) {
            return Err(Error::StaleMorph(id));
        }
        Ok(())
    }

    fn is_selected(&self, bank: usize, slot: usize) -> bool {
        self.bank == bank && self.snap == Some(slot)
    }
}

fn check_slot(slot: usize) -> Result<(), Error> {
    if slot >= SLOTS_PER_BANK {
        return Err(Error::out_of_range("slot", slot, SLOTS_PER_BANK));
    }
    Ok(())
}

/// Pins a project to the limits of the license and the data model.
fn normalize(mut project: Project, license: &License) -> Project {
    project.parameters.truncate(MAX_PARAMETERS);
    project.banks.truncate(license.bank_count());
    if project.banks.is_empty() {
        project.banks.push(Bank::new("Bank 1"));
    }
    for bank in project.banks.iter_mut() {
        bank.normalize();
    }

    let count = project.parameters.len();
    for snap in project.snaps_mut() {
        snap.values.resize(count, DEFAULT_VALUE);
        for value in snap.values.iter_mut() {
            *value = (*value).min(MAX_VALUE);
        }
    }
    project
}

/// The single source of truth for the project and the controller session.
///
/// Every mutation happens under one write lock. The matching event is published
/// before the lock is released, so a subscriber that reacts to an event always
/// observes the change it describes.
pub struct Store {
    state: RwLock<State>,
    bus: EventBus,
    license: License,
    next_morph: AtomicU64,
}

impl Store {
    pub fn new(project: Project, license: License, bus: EventBus) -> Store {
        Store {
            state: RwLock::new(State::new(normalize(project, &license))),
            bus,
            license,
            next_morph: AtomicU64::new(0),
        }
    }

    pub fn license(&self) -> License {
        self.license
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    fn notify(&self, event: Event) {
        let kind = event.kind();
        match self.bus.publish(event) {
            Ok(_) => {}
            Err(Error::ChannelClosed) => debug!(event = kind, "Event bus closed."),
            Err(e) => warn!(event = kind, err = e.to_string(), "Unable to publish event."),
        }
    }

    /// Selects a snap and makes its values the live frame. Returns the CC
    /// values to send, in parameter order.
    pub fn select_snap(&self, bank: usize, index: usize) -> Result<Vec<CcValue>, Error> {
        let mut state = self.state.write();
        let values = state.snap(bank, index)?.values.clone();

        state.bank = bank;
        state.snap = Some(index);
        state.remembered[bank] = Some(index);
        state.live.clone_from(&values);
        state.morph = None;
        let cc_values = state.cc_values(&values);

        info!(bank, snap = index, "Snap selected.");
        self.notify(Event::SnapSelected { bank, snap: index });
        Ok(cc_values)
    }

    /// Switches to a bank and restores its remembered snap, or slot 0 on the
    /// first visit. Returns the snap index announced.
    pub fn select_bank(&self, bank: usize) -> Result<usize, Error> {
        let licensed = self.license.bank_count();
        if bank >= licensed {
            return Err(Error::out_of_range("bank", bank, licensed));
        }

        let mut state = self.state.write();
        let occupied = state.bank(bank)?.is_occupied(0);
        let snap = state.remembered[bank].unwrap_or(0);

        state.morph = None;
        state.bank = bank;
        state.snap = if state.remembered[bank].is_some() || occupied {
            Some(snap)
        } else {
            None
        };

        info!(bank, snap, "Bank selected.");
        self.notify(Event::SnapSelected { bank, snap });
        Ok(snap)
    }

    /// Edits a value of the selected snap. The value is clamped to the MIDI range.
    /// Without a selection only the live frame changes.
    pub fn edit_parameter_value(&self, param: usize, value: i32) -> Result<CcValue, Error> {
        let value = value.clamp(0, i32::from(MAX_VALUE)) as u8;

        let mut state = self.state.write();
        let count = state.project.parameters.len();
        let cc = state
            .project
            .parameters
            .get(param)
            .map(|parameter| parameter.cc)
            .ok_or_else(|| Error::out_of_range("parameter", param, count))?;

        if let Some(slot) = state.snap {
            let bank = state.bank;
            state.snap_mut(bank, slot)?.values[param] = value;
        }
        state.live[param] = value;
        state.morph = None;

        debug!(param, value, "Parameter edited.");
        self.notify(Event::ParameterEdited { param, value });
        Ok(CcValue { param, cc, value })
    }

    /// Creates a snap with default values in an empty slot.
    pub fn add_snap(
        &self,
        bank: usize,
        index: usize,
        name: &str,
        description: &str,
    ) -> Result<(), Error> {
        let mut state = self.state.write();
        let count = state.project.parameters.len();
        *state.empty_slot_mut(bank, index)? = Some(Snap::new(name, description, count));

        info!(bank, snap = index, name, "Snap added.");
        self.notify(Event::SnapAdded { bank, snap: index });
        Ok(())
    }

    /// Copies a snap into an empty slot of the same bank.
    pub fn duplicate_snap(&self, bank: usize, from: usize, to: usize) -> Result<(), Error> {
        let mut state = self.state.write();
        let mut snap = state.snap(bank, from)?.clone();
        snap.name = format!("{} (copy)", snap.name);
        *state.empty_slot_mut(bank, to)? = Some(snap);

        info!(bank, from, to, "Snap duplicated.");
        self.notify(Event::SnapAdded { bank, snap: to });
        Ok(())
    }

    /// Updates the free-text description of a snap.
    pub fn update_snap_description(
        &self,
        bank: usize,
        index: usize,
        text: &str,
    ) -> Result<(), Error> {
        let mut state = self.state.write();
        state.snap_mut(bank, index)?.description = text.to_string();
        self.notify(Event::SnapUpdated { bank, snap: index });
        Ok(())
    }

    /// Appends a parameter. Every snap gains the default value for it.
    pub fn add_parameter(&self, name: &str, description: &str, cc: u8) -> Result<usize, Error> {
        if cc > MAX_VALUE {
            return Err(Error::out_of_range("cc", usize::from(cc), 128));
        }

        let mut state = self.state.write();
        if state.project.parameters.len() >= MAX_PARAMETERS {
            return Err(Error::ParameterLimit(MAX_PARAMETERS));
        }

        state
            .project
            .parameters
            .push(Parameter::new(name, description, cc));
        for snap in state.project.snaps_mut() {
            snap.values.push(DEFAULT_VALUE);
        }
        state.live.push(DEFAULT_VALUE);
        state.morph = None;

        let count = state.project.parameters.len();
        info!(name, cc, count, "Parameter added.");
        self.notify(Event::ParametersChanged { count });
        Ok(count - 1)
    }

    /// Removes a parameter and its value from every snap.
    pub fn remove_parameter(&self, index: usize) -> Result<(), Error> {
        let mut state = self.state.write();
        let count = state.project.parameters.len();
        if index >= count {
            return Err(Error::out_of_range("parameter", index, count));
        }

        let parameter = state.project.parameters.remove(index);
        for snap in state.project.snaps_mut() {
            snap.values.remove(index);
        }
        state.live.remove(index);
        state.morph = None;

        let count = state.project.parameters.len();
        info!(name = parameter.name, count, "Parameter removed.");
        self.notify(Event::ParametersChanged { count });
        Ok(())
    }

    /// Makes a new morph the only one allowed to write frames and returns its id.
    pub fn begin_morph(&self) -> u64 {
        let id = self.next_morph.fetch_add(1, Ordering::Relaxed);
        self.state.write().morph = Some(id);
        id
    }

    /// Stops the morph from writing any more frames.
    pub fn cancel_morph(&self, id: u64) {
        let mut state = self.state.write();
        if state.morph == Some(id) {
            state.morph = None;
        }
    }

    /// The id of the morph allowed to write frames, if any.
    pub fn active_morph(&self) -> Option<u64> {
        self.state.read().morph
    }

    /// Applies a morph frame to the live values. One CC event is published per
    /// changed value in ascending parameter order. Returns the number changed.
    /// Frames from a morph that is no longer active are rejected.
    pub fn apply_morph_frame(&self, id: u64, values: &[u8]) -> Result<usize, Error> {
        let mut state = self.state.write();
        state.check_morph(id)?;
        state.check_frame(values)?;
        let changed = state.apply_live(values);
        for cc_value in changed.iter() {
            self.notify(cc_value.event());
        }
        Ok(changed.len())
    }

    /// Lands a morph: applies the final frame, writes it into the destination
    /// snap and selects it.
    pub fn complete_morph(
        &self,
        id: u64,
        bank: usize,
        index: usize,
        values: &[u8],
    ) -> Result<(), Error> {
        let mut state = self.state.write();
        state.check_morph(id)?;
        state.check_frame(values)?;
        let values: Vec<u8> = values.iter().map(|value| (*value).min(MAX_VALUE)).collect();
        state.snap_mut(bank, index)?.values.clone_from(&values);

        for cc_value in state.apply_live(&values) {
            self.notify(cc_value.event());
        }
        state.bank = bank;
        state.snap = Some(index);
        state.remembered[bank] = Some(index);
        state.morph = None;

        info!(bank, snap = index, "Morph landed.");
        self.notify(Event::SnapSelected { bank, snap: index });
        Ok(())
    }

    /// Replaces the whole project, as after a load. The session starts over.
    pub fn replace_project(&self, project: Project) {
        let project = normalize(project, &self.license);
        let mut state = self.state.write();
        info!(project = project.to_string(), "Project loaded.");
        *state = State::new(project);
        self.notify(Event::ProjectLoaded);
    }

    /// Announces that values were requested for a snap.
    pub fn request_generation(&self, bank: usize, index: usize) -> Result<(), Error> {
        let state = self.state.read();
        state.snap(bank, index)?;
        self.notify(Event::AiGenerationRequested { bank, snap: index });
        Ok(())
    }

    /// Writes generated values into a snap. When the snap is selected, the
    /// changed values go out through the same path as morph frames.
    pub fn apply_generated_values(
        &self,
        bank: usize,
        index: usize,
        values: &[u8],
    ) -> Result<(), Error> {
        let mut state = self.state.write();
        state.check_frame(values)?;
        let values: Vec<u8> = values.iter().map(|value| (*value).min(MAX_VALUE)).collect();
        state.snap_mut(bank, index)?.values.clone_from(&values);

        if state.is_selected(bank, index) {
            for cc_value in state.apply_live(&values) {
                self.notify(cc_value.event());
            }
        }

        info!(bank, snap = index, "Generated values applied.");
        self.notify(Event::AiGenerationCompleted {
            bank,
            snap: index,
            values,
        });
        Ok(())
    }

    /// Surfaces a failed generation. The reason is passed through unchanged.
    pub fn report_generation_failure(
        &self,
        bank: usize,
        index: usize,
        reason: &str,
    ) -> Result<(), Error> {
        let state = self.state.read();
        state.bank(bank)?;
        check_slot(index)?;
        warn!(bank, snap = index, reason, "Value generation failed.");
        self.notify(Event::AiGenerationFailed {
            bank,
            snap: index,
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// A copy of the whole project.
    pub fn snapshot(&self) -> Project {
        self.state.read().project.clone()
    }

    pub fn session(&self) -> Session {
        let state = self.state.read();
        let occupied: Vec<bool> = state
            .project
            .banks
            .get(state.bank)
            .map(|bank| (0..SLOTS_PER_BANK).map(|slot| bank.is_occupied(slot)).collect())
            .unwrap_or_default();
        Session {
            bank: state.bank,
            snap: state.snap,
            bank_count: state.project.banks.len(),
            occupied,
            remembered: state.remembered.clone(),
        }
    }

    /// The values most recently sent per parameter.
    pub fn live_frame(&self) -> Vec<u8> {
        self.state.read().live.clone()
    }

    /// The live frame as CC values.
    pub fn live_cc_values(&self) -> Vec<CcValue> {
        let state = self.state.read();
        state.cc_values(&state.live)
    }

    pub fn snap_values(&self, bank: usize, index: usize) -> Result<Vec<u8>, Error> {
        Ok(self.state.read().snap(bank, index)?.values.clone())
    }

    pub fn is_occupied(&self, bank: usize, index: usize) -> bool {
        self.state
            .read()
            .project
            .banks
            .get(bank)
            .is_some_and(|bank| bank.is_occupied(index))
    }

    pub fn parameters(&self) -> Vec<Parameter> {
        self.state.read().project.parameters.clone()
    }
}
