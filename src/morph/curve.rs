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
use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::project::MAX_VALUE;

/// The shape a morph follows between its source and destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MorphCurve {
    #[default]
    Linear,
    Exponential,
    Logarithmic,
    SCurve,
}

impl MorphCurve {
    pub const ALL: [MorphCurve; 4] = [
        MorphCurve::Linear,
        MorphCurve::Exponential,
        MorphCurve::Logarithmic,
        MorphCurve::SCurve,
    ];

    /// Warps a linear fraction. The input is clamped to [0, 1] and both
    /// endpoints map to themselves exactly.
    pub fn apply(&self, t: f64) -> f64 {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        if t == 0.0 || t == 1.0 {
            return t;
        }

        match self {
            MorphCurve::Linear => t,
            MorphCurve::Exponential => t * t,
            MorphCurve::Logarithmic => t.sqrt(),
            MorphCurve::SCurve => t * t * (3.0 - 2.0 * t),
        }
    }
}

impl fmt::Display for MorphCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MorphCurve::Linear => "linear",
            MorphCurve::Exponential => "exponential",
            MorphCurve::Logarithmic => "logarithmic",
            MorphCurve::SCurve => "s-curve",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for MorphCurve {
    type Err = String;

    fn from_str(s: &str) -> Result<MorphCurve, String> {
        match s.to_lowercase().as_str() {
            "linear" => Ok(MorphCurve::Linear),
            "exponential" => Ok(MorphCurve::Exponential),
            "logarithmic" => Ok(MorphCurve::Logarithmic),
            "s-curve" | "scurve" => Ok(MorphCurve::SCurve),
            _ => Err(format!("unknown morph curve {}", s)),
        }
    }
}

/// Computes one morph frame: `round(from + (to - from) * curve(progress))`
/// for every parameter. The two value sets must be the same length.
pub fn interpolate(from: &[u8], to: &[u8], curve: MorphCurve, progress: f64) -> Vec<u8> {
    let fraction = curve.apply(progress);
    from.iter()
        .zip(to.iter())
        .map(|(&from, &to)| {
            let from = f64::from(from);
            let value = from + (f64::from(to) - from) * fraction;
            value.round().clamp(0.0, f64::from(MAX_VALUE)) as u8
        })
        .collect()
}
