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

use serde::Deserialize;

use crate::{morph::MorphCurve, project::MAX_BANKS};

/// The license tier the runtime was started with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Pro,
}

/// Capabilities unlocked by the license. This is passed to the store and the
/// morph engine at construction so both tiers run out of the same binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct License {
    tier: Tier,
}

impl License {
    pub fn new(tier: Tier) -> License {
        License { tier }
    }

    pub fn free() -> License {
        License::new(Tier::Free)
    }

    pub fn pro() -> License {
        License::new(Tier::Pro)
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// The number of banks the performer may address.
    pub fn bank_count(&self) -> usize {
        match self.tier {
            Tier::Free => 1,
            Tier::Pro => MAX_BANKS,
        }
    }

    /// Only linear morphs are available on the free tier.
    pub fn allows_curve(&self, curve: MorphCurve) -> bool {
        match self.tier {
            Tier::Free => curve == MorphCurve::Linear,
            Tier::Pro => true,
        }
    }
}

impl fmt::Display for License {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tier {
            Tier::Free => write!(f, "free"),
            Tier::Pro => write!(f, "pro"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_tiers() {
        let free = License::free();
        assert_eq!(1, free.bank_count());
        assert!(free.allows_curve(MorphCurve::Linear));
        assert!(!free.allows_curve(MorphCurve::SCurve));
        assert!(!free.allows_curve(MorphCurve::Exponential));

        let pro = License::pro();
        assert_eq!(56, pro.bank_count());
        for curve in MorphCurve::ALL {
            assert!(pro.allows_curve(curve));
        }
    }
}
