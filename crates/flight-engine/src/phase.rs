// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Flight phase classification from instantaneous kinematics.
//!
//! Classification is stateless: every call looks only at the reported
//! ground flag, vertical rate, altitude, and ground speed. Rules are applied
//! in order and the first match wins:
//!
//! 1. on the ground → [`FlightPhase::Grounded`]
//! 2. climbing faster than the vertical-rate threshold → `Departing` below
//!    the terminal altitude, `Climbing` at or above it
//! 3. descending faster than the threshold → `Landing` / `Descending`
//! 4. slow and above the holding floor → `Holding`
//! 5. anything else → `Cruising`
//!
//! The thresholds are heuristics, not ATC phase definitions, so they live in
//! [`PhaseThresholds`] and can be tuned from configuration.

use serde::{Deserialize, Serialize};

use crate::flight::{Flight, FlightPhase};

/// Tunable cut-offs for [`PhaseClassifier`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseThresholds {
    /// Vertical rate magnitude (m/s) above which a flight counts as climbing or descending.
    pub vertical_rate_mps: f64,
    /// Altitude (m) below which climbs are departures and descents are landings.
    pub terminal_altitude_m: f64,
    /// Ground speed (m/s) below which an airborne flight may be holding (~213 kt).
    pub holding_speed_mps: f64,
    /// Minimum altitude (m) for the holding rule to apply.
    pub holding_min_altitude_m: f64,
}

impl Default for PhaseThresholds {
    fn default() -> Self {
        Self {
            vertical_rate_mps: 2.0,
            terminal_altitude_m: 1500.0,
            holding_speed_mps: 110.0,
            holding_min_altitude_m: 1000.0,
        }
    }
}

/// Maps a flight's kinematics to a [`FlightPhase`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseClassifier {
    thresholds: PhaseThresholds,
}

impl PhaseClassifier {
    #[must_use]
    pub fn new(thresholds: PhaseThresholds) -> Self {
        Self { thresholds }
    }

    /// Classify a flight. Total: every input yields exactly one phase.
    ///
    /// The flight's current `phase` field is ignored.
    #[must_use]
    pub fn classify(&self, flight: &Flight) -> FlightPhase {
        let t = &self.thresholds;

        if flight.on_ground {
            return FlightPhase::Grounded;
        }

        if flight.vertical_rate > t.vertical_rate_mps {
            return if flight.altitude < t.terminal_altitude_m {
                FlightPhase::Departing
            } else {
                FlightPhase::Climbing
            };
        }

        if flight.vertical_rate < -t.vertical_rate_mps {
            return if flight.altitude < t.terminal_altitude_m {
                FlightPhase::Landing
            } else {
                FlightPhase::Descending
            };
        }

        if flight.ground_speed < t.holding_speed_mps && flight.altitude > t.holding_min_altitude_m {
            return FlightPhase::Holding;
        }

        FlightPhase::Cruising
    }

    /// Recompute and store the phase of `flight`.
    pub fn apply(&self, flight: &mut Flight) {
        flight.phase = self.classify(flight);
    }
}

/// Classify with the default thresholds.
#[must_use]
pub fn classify(flight: &Flight) -> FlightPhase {
    PhaseClassifier::default().classify(flight)
}
