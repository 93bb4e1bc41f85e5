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

//! Flight data model.
//!
//! A [`Flight`] is the single authoritative record for one aircraft. Its
//! position is advanced in place by the tracker between polls, while its
//! kinematics and [`FlightPhase`] only change when fresh telemetry arrives.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Callsign shown when the upstream sends a blank one.
pub const DEFAULT_CALLSIGN: &str = "N/A";

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

/// Rectangular lat/lon region used to scope an upstream query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lon_min: f64,
    pub lat_max: f64,
    pub lon_max: f64,
}

impl BoundingBox {
    /// Build a box extending `half_span` degrees from `center` on each axis.
    #[must_use]
    pub fn around(center: Coordinate, half_span: f64) -> Self {
        Self {
            lat_min: center.latitude - half_span,
            lon_min: center.longitude - half_span,
            lat_max: center.latitude + half_span,
            lon_max: center.longitude + half_span,
        }
    }

    #[must_use]
    pub fn contains(&self, point: Coordinate) -> bool {
        (self.lat_min..=self.lat_max).contains(&point.latitude)
            && (self.lon_min..=self.lon_max).contains(&point.longitude)
    }
}

/// Discrete classification of what an aircraft is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlightPhase {
    Grounded,
    Departing,
    Climbing,
    Landing,
    Descending,
    Holding,
    Cruising,
}

impl FlightPhase {
    /// All phases in display order.
    pub const ALL: [FlightPhase; 7] = [
        FlightPhase::Grounded,
        FlightPhase::Departing,
        FlightPhase::Climbing,
        FlightPhase::Landing,
        FlightPhase::Descending,
        FlightPhase::Holding,
        FlightPhase::Cruising,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FlightPhase::Grounded => "grounded",
            FlightPhase::Departing => "departing",
            FlightPhase::Climbing => "climbing",
            FlightPhase::Landing => "landing",
            FlightPhase::Descending => "descending",
            FlightPhase::Holding => "holding",
            FlightPhase::Cruising => "cruising",
        }
    }
}

impl fmt::Display for FlightPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tracked aircraft.
#[derive(Debug, Clone, PartialEq)]
pub struct Flight {
    /// Upstream transponder code, or `sim-N` for synthetic flights.
    pub id: String,
    /// Display label, never blank.
    pub callsign: String,
    /// Current position, advanced every animation frame.
    pub position: Coordinate,
    /// Altitude in meters, never negative.
    pub altitude: f64,
    /// Ground speed in meters per second, never negative.
    pub ground_speed: f64,
    /// Direction of travel in degrees, in `[0, 360)`.
    pub heading: f64,
    /// Vertical rate in meters per second (positive = climbing).
    pub vertical_rate: f64,
    /// Whether the source reports the aircraft on the ground.
    pub on_ground: bool,
    /// Phase derived from the last ingested telemetry.
    pub phase: FlightPhase,
}

impl Flight {
    /// Case-insensitive match against callsign or id.
    #[must_use]
    pub fn matches_query(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return false;
        }
        self.callsign.to_lowercase().contains(&query) || self.id.to_lowercase().contains(&query)
    }
}

/// Where a batch of flights came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataOrigin {
    /// Freshly fetched from the upstream provider.
    Live,
    /// Served from the polling cache without a network request.
    Cached,
    /// Generated locally because the upstream was unavailable.
    Synthetic,
}

impl fmt::Display for DataOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataOrigin::Live => "live",
            DataOrigin::Cached => "cached",
            DataOrigin::Synthetic => "synthetic",
        })
    }
}

/// One fetch cycle's worth of flights.
///
/// The flight list is shared: a cache hit hands back the same allocation the
/// original fetch produced, so consumers can detect repeats with
/// [`Arc::ptr_eq`].
#[derive(Debug, Clone)]
pub struct FlightBatch {
    pub flights: Arc<Vec<Flight>>,
    pub origin: DataOrigin,
}

impl FlightBatch {
    #[must_use]
    pub fn new(flights: Vec<Flight>, origin: DataOrigin) -> Self {
        Self {
            flights: Arc::new(flights),
            origin,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.flights.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }
}

/// Normalize a heading in degrees to `[0, 360)`.
#[must_use]
pub fn normalize_heading(degrees: f64) -> f64 {
    if !degrees.is_finite() {
        return 0.0;
    }
    let normalized = degrees.rem_euclid(360.0);
    // rem_euclid rounds tiny negative inputs up to exactly 360.0
    if normalized >= 360.0 {
        0.0
    } else {
        normalized
    }
}
