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
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::license::License;

/// The most banks any project may hold.
pub const MAX_BANKS: usize = 56;

/// Every bank has one slot per performance pad.
pub const SLOTS_PER_BANK: usize = 56;

/// The most parameters a project may define.
pub const MAX_PARAMETERS: usize = 64;

/// The value new snaps and new parameters start at.
pub const DEFAULT_VALUE: u8 = 64;

/// The largest value a MIDI CC can carry.
pub const MAX_VALUE: u8 = 127;

/// A user-defined automation channel, mapped to a MIDI CC number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub description: String,
    pub cc: u8,
}

impl Parameter {
    pub fn new(name: &str, description: &str, cc: u8) -> Parameter {
        Parameter {
            name: name.to_string(),
            description: description.to_string(),
            cc,
        }
    }
}

/// A complete set of parameter values, in parameter order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snap {
    pub name: String,
    pub description: String,
    pub values: Vec<u8>,
}

impl Snap {
    /// Creates a snap with every parameter at the default value.
    pub fn new(name: &str, description: &str, parameter_count: usize) -> Snap {
        Snap {
            name: name.to_string(),
            description: description.to_string(),
            values: vec![DEFAULT_VALUE; parameter_count],
        }
    }
}

/// A named, sparse set of snap slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bank {
    pub name: String,
    slots: Vec<Option<Snap>>,
}

impl Bank {
    pub fn new(name: &str) -> Bank {
        Bank {
            name: name.to_string(),
            slots: vec![None; SLOTS_PER_BANK],
        }
    }

    /// Gets the snap at the given slot, if there is one.
    pub fn snap(&self, slot: usize) -> Option<&Snap> {
        self.slots.get(slot).and_then(|slot| slot.as_ref())
    }

    pub(crate) fn snap_mut(&mut self, slot: usize) -> Option<&mut Snap> {
        self.slots.get_mut(slot).and_then(|slot| slot.as_mut())
    }

    pub(crate) fn slot_mut(&mut self, slot: usize) -> Option<&mut Option<Snap>> {
        self.slots.get_mut(slot)
    }

    /// Returns true if the slot holds a snap.
    pub fn is_occupied(&self, slot: usize) -> bool {
        self.snap(slot).is_some()
    }

    /// Iterates over the occupied slots and their snaps.
    pub fn snaps(&self) -> impl Iterator<Item = (usize, &Snap)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, snap)| snap.as_ref().map(|snap| (slot, snap)))
    }

    pub(crate) fn snaps_mut(&mut self) -> impl Iterator<Item = &mut Snap> {
        self.slots.iter_mut().filter_map(|snap| snap.as_mut())
    }

    /// Deserialized banks may carry any number of slots, so pin them to the
    /// grid size.
    pub(crate) fn normalize(&mut self) {
        self.slots.resize(SLOTS_PER_BANK, None);
    }
}

/// A project holds the banks and parameters being performed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub banks: Vec<Bank>,
    pub parameters: Vec<Parameter>,
    /// Credential for the external value-suggestion service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Project {
    /// Creates an empty project with the given number of banks.
    pub fn new(name: &str, bank_count: usize) -> Project {
        Project {
            name: name.to_string(),
            banks: (0..bank_count.clamp(1, MAX_BANKS))
                .map(|bank| Bank::new(&format!("Bank {}", bank + 1)))
                .collect(),
            parameters: Vec::new(),
            api_key: None,
        }
    }

    /// Creates an empty project with every bank the license unlocks.
    pub fn for_license(name: &str, license: &License) -> Project {
        Project::new(name, license.bank_count())
    }

    /// Iterates over every snap in every bank.
    pub fn snaps(&self) -> impl Iterator<Item = &Snap> {
        self.banks
            .iter()
            .flat_map(|bank| bank.snaps().map(|(_, snap)| snap))
    }

    pub(crate) fn snaps_mut(&mut self) -> impl Iterator<Item = &mut Snap> {
        self.banks.iter_mut().flat_map(|bank| bank.snaps_mut())
    }
}

impl Default for Project {
    fn default() -> Project {
        Project::new("New Project", 1)
    }
}

impl fmt::Display for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} banks, {} parameters, {} snaps)",
            self.name,
            self.banks.len(),
            self.parameters.len(),
            self.snaps().count()
        )
    }
}

#[cfg(test)]
mod test {
    use crate::{events::EventBus, store::Store};

    use super::*;

    #[test]
    fn test_new_project() {
        let project = Project::new("Test", 3);
        assert_eq!(3, project.banks.len());
        assert_eq!("Bank 2", project.banks[1].name);
        assert_eq!(0, project.snaps().count());

        // Bank counts are kept within bounds.
        assert_eq!(1, Project::new("Test", 0).banks.len());
        assert_eq!(MAX_BANKS, Project::new("Test", 500).banks.len());
    }

    #[test]
    fn test_project_for_license() {
        assert_eq!(1, Project::for_license("Free", &License::free()).banks.len());

        let project = Project::for_license("Pro", &License::pro());
        assert_eq!(MAX_BANKS, project.banks.len());
        let store = Store::new(project, License::pro(), EventBus::new(16));
        assert_eq!(Ok(0), store.select_bank(3));
        assert_eq!(3, store.session().bank);
    }

    #[test]
    fn test_bank_slots() {
        let mut bank = Bank::new("Bank");
        assert!(!bank.is_occupied(3));
        *bank.slot_mut(3).expect("slot should exist") = Some(Snap::new("Snap", "", 2));
        assert!(bank.is_occupied(3));
        assert_eq!(vec![64, 64], bank.snap(3).expect("snap should exist").values);
        assert!(bank.snap(SLOTS_PER_BANK).is_none());
        assert_eq!(vec![3], bank.snaps().map(|(slot, _)| slot).collect::<Vec<_>>());
    }

    #[test]
    fn test_project_serde() {
        let mut project = Project::new("Serde", 1);
        project.parameters.push(Parameter::new("Cutoff", "Filter cutoff", 74));
        *project.banks[0].slot_mut(0).expect("slot should exist") =
            Some(Snap::new("Intro", "Quiet", 1));

        let json = serde_json::to_string(&project).expect("serialize");
        assert!(!json.contains("api_key"));
        let parsed: Project = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(project, parsed);
    }
}
