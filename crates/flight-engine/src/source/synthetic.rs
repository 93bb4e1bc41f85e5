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

//! Deterministic synthetic traffic.
//!
//! Flights circle the center on fixed radii. Their angle depends only on the
//! wall-clock second and their index, so two calls at the same instant and
//! center return identical flights. Kinematic profiles rotate every five
//! indices so that every [`FlightPhase`](crate::FlightPhase) shows up.

use std::f64::consts::{FRAC_PI_2, TAU};

use async_trait::async_trait;
use chrono::Utc;

use super::FlightSource;
use crate::flight::{normalize_heading, Coordinate, DataOrigin, Flight, FlightBatch};
use crate::phase::PhaseClassifier;
use crate::protocol::StateVector;

const DEFAULT_FLIGHT_COUNT: u32 = 20;
// Shrinks the north-south radius to offset Mercator stretching
const LATITUDE_SCALE: f64 = 0.7;

/// Generates circling synthetic flights around a center.
#[derive(Debug, Clone)]
pub struct SyntheticFlightGenerator {
    count: u32,
    classifier: PhaseClassifier,
}

impl Default for SyntheticFlightGenerator {
    fn default() -> Self {
        Self::new(PhaseClassifier::default())
    }
}

impl SyntheticFlightGenerator {
    #[must_use]
    pub fn new(classifier: PhaseClassifier) -> Self {
        Self {
            count: DEFAULT_FLIGHT_COUNT,
            classifier,
        }
    }

    /// Generate flights for the current wall-clock time.
    #[must_use]
    pub fn generate(&self, center: Coordinate) -> Vec<Flight> {
        let now_seconds = Utc::now().timestamp_millis() as f64 / 1000.0;
        self.generate_at(center, now_seconds)
    }

    /// Generate flights as they would be at `now_seconds` (Unix time).
    #[must_use]
    pub fn generate_at(&self, center: Coordinate, now_seconds: f64) -> Vec<Flight> {
        (0..self.count)
            .map(|i| synthetic_state(i, center, now_seconds).into_flight(&self.classifier))
            .collect()
    }
}

#[async_trait]
impl FlightSource for SyntheticFlightGenerator {
    async fn fetch_flights(&self, center: Coordinate) -> FlightBatch {
        FlightBatch::new(self.generate(center), DataOrigin::Synthetic)
    }
}

fn synthetic_state(i: u32, center: Coordinate, now_seconds: f64) -> StateVector {
    let index = f64::from(i);
    let angular_speed = 0.02 + f64::from(i % 5) * 0.005;
    let seed = index * 100.0;
    let angle = (now_seconds * angular_speed + seed).rem_euclid(TAU);

    let radius = 0.05 + f64::from(i % 3) * 0.08;
    let latitude = center.latitude + angle.sin() * radius * LATITUDE_SCALE;
    let longitude = center.longitude + angle.cos() * radius;

    let (altitude, ground_speed, vertical_rate, on_ground) = match i % 5 {
        // Climb out: low and climbing hard
        0 => (500.0 + index * 120.0, 120.0 + index * 2.0, 10.0, false),
        // Approach: low and descending hard
        1 => (500.0 + index * 120.0, 110.0, -7.0, false),
        // Hold: slow and high
        2 => (2000.0 + index * 100.0, 85.0, 0.0, false),
        3 => (0.0, 0.0, 0.0, true),
        _ => (3000.0 + index * 500.0, 150.0 + index * 10.0, 0.0, false),
    };

    StateVector {
        id: format!("sim-{i}"),
        callsign: Some(format!("UA{}", 200 + i)),
        latitude,
        longitude,
        altitude: Some(altitude),
        ground_speed: Some(ground_speed),
        heading: Some(normalize_heading((angle + FRAC_PI_2).to_degrees())),
        vertical_rate: Some(vertical_rate),
        on_ground,
    }
}
