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

//! Protocol layer for upstream telemetry payloads.
//!
//! Parsers turn raw response bodies into [`StateVector`]s, a source-neutral
//! telemetry snapshot. Converting a state vector into a [`Flight`] is the one
//! place phase classification happens, so real and synthetic data share a
//! single labeling path.

mod opensky;

pub use opensky::OpenSkyParser;

use thiserror::Error;

use crate::flight::{normalize_heading, Coordinate, Flight, FlightPhase, DEFAULT_CALLSIGN};
use crate::phase::PhaseClassifier;

/// Errors that can occur while decoding a telemetry payload.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid payload format: {0}")]
    InvalidFormat(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// A single telemetry snapshot for one aircraft.
///
/// Optional fields mirror what upstream providers routinely omit.
#[derive(Debug, Clone, PartialEq)]
pub struct StateVector {
    /// Transponder address or synthetic id.
    pub id: String,
    pub callsign: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    /// Altitude in meters.
    pub altitude: Option<f64>,
    /// Ground speed in meters per second.
    pub ground_speed: Option<f64>,
    /// True track in degrees.
    pub heading: Option<f64>,
    /// Vertical rate in meters per second.
    pub vertical_rate: Option<f64>,
    pub on_ground: bool,
}

impl StateVector {
    /// Build a classified [`Flight`] from this snapshot.
    ///
    /// Missing altitude, speed, heading, and vertical rate become zero;
    /// negative altitude and speed are clamped to zero. A missing vertical
    /// rate therefore biases classification toward `Cruising`/`Holding`.
    #[must_use]
    pub fn into_flight(self, classifier: &PhaseClassifier) -> Flight {
        let callsign = self
            .callsign
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CALLSIGN)
            .to_string();

        let mut flight = Flight {
            id: self.id,
            callsign,
            position: Coordinate::new(self.latitude, self.longitude),
            altitude: finite_or_zero(self.altitude).max(0.0),
            ground_speed: finite_or_zero(self.ground_speed).max(0.0),
            heading: normalize_heading(finite_or_zero(self.heading)),
            vertical_rate: finite_or_zero(self.vertical_rate),
            on_ground: self.on_ground,
            phase: FlightPhase::Cruising,
        };
        classifier.apply(&mut flight);
        flight
    }
}

fn finite_or_zero(value: Option<f64>) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Trait for telemetry payload parsers.
///
/// Implement this trait to add support for another provider's format.
pub trait Protocol {
    /// The message type produced by this parser.
    type Message;
    /// The error type for parsing failures.
    type Error;

    /// Parse input bytes into a message.
    ///
    /// Returns `Ok(Some(message))` if parsing succeeded,
    /// `Ok(None)` if the input is valid but carries no data,
    /// or `Err(error)` if parsing failed.
    fn parse(&mut self, input: &[u8]) -> Result<Option<Self::Message>, Self::Error>;
}
