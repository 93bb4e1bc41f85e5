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

//! OpenSky Network `states/all` parser.
//!
//! The response carries each state vector as a positional JSON array:
//! ```text
//! [icao24, callsign, origin_country, time_position, last_contact,
//!  longitude, latitude, baro_altitude, on_ground, velocity, true_track,
//!  vertical_rate, sensors, geo_altitude, squawk, spi, position_source, ...]
//! ```

use std::collections::HashSet;
use std::fmt;

use log::debug;
use serde::de::{self, DeserializeSeed, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::Deserializer;
use serde_json::Value;

use super::{ParseError, Protocol, StateVector};

const ICAO24: usize = 0;
const CALLSIGN: usize = 1;
const LONGITUDE: usize = 5;
const LATITUDE: usize = 6;
const BARO_ALTITUDE: usize = 7;
const ON_GROUND: usize = 8;
const VELOCITY: usize = 9;
const TRUE_TRACK: usize = 10;
const VERTICAL_RATE: usize = 11;

/// Parser for OpenSky state-vector responses.
///
/// Rows without a position are dropped, duplicate ids keep the first row,
/// and once `max_flights` rows have been accepted the rest of the array is
/// skipped without being materialized.
#[derive(Debug, Clone)]
pub struct OpenSkyParser {
    max_flights: usize,
}

impl OpenSkyParser {
    #[must_use]
    pub fn new(max_flights: usize) -> Self {
        Self { max_flights }
    }
}

impl Default for OpenSkyParser {
    fn default() -> Self {
        Self::new(50)
    }
}

impl Protocol for OpenSkyParser {
    type Message = Vec<StateVector>;
    type Error = ParseError;

    fn parse(&mut self, input: &[u8]) -> Result<Option<Vec<StateVector>>, ParseError> {
        let invalid = |e: serde_json::Error| ParseError::InvalidFormat(e.to_string());

        let mut deserializer = serde_json::Deserializer::from_slice(input);
        let states = ResponseSeed {
            max_flights: self.max_flights,
        }
        .deserialize(&mut deserializer)
        .map_err(invalid)?;
        deserializer.end().map_err(invalid)?;

        Ok(states)
    }
}

/// Top-level response object. Only `states` is read; other keys are skipped.
struct ResponseSeed {
    max_flights: usize,
}

impl<'de> DeserializeSeed<'de> for ResponseSeed {
    type Value = Option<Vec<StateVector>>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for ResponseSeed {
    type Value = Option<Vec<StateVector>>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a states/all response object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut states = None;
        while let Some(key) = map.next_key::<String>()? {
            if key == "states" {
                states = map.next_value_seed(StatesSeed {
                    max_flights: self.max_flights,
                })?;
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(states)
    }
}

/// The `states` value: `null` or an array of rows.
struct StatesSeed {
    max_flights: usize,
}

impl<'de> DeserializeSeed<'de> for StatesSeed {
    type Value = Option<Vec<StateVector>>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_option(self)
    }
}

impl<'de> Visitor<'de> for StatesSeed {
    type Value = Option<Vec<StateVector>>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("null or an array of state vectors")
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_seq(self)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut seen = HashSet::new();
        let mut vectors = Vec::with_capacity(self.max_flights.min(64));

        while vectors.len() < self.max_flights {
            let Some(row) = seq.next_element::<Vec<Value>>()? else {
                return Ok(Some(vectors));
            };
            match parse_row(&row) {
                Ok(state) => {
                    if seen.insert(state.id.clone()) {
                        vectors.push(state);
                    }
                }
                Err(e) => debug!("Skipping state vector: {}", e),
            }
        }

        let mut skipped = 0usize;
        while seq.next_element::<IgnoredAny>()?.is_some() {
            skipped += 1;
        }
        if skipped > 0 {
            debug!("Flight limit reached, skipped {} remaining rows", skipped);
        }

        Ok(Some(vectors))
    }
}

fn number(row: &[Value], index: usize) -> Option<f64> {
    row.get(index).and_then(Value::as_f64)
}

fn parse_row(row: &[Value]) -> Result<StateVector, ParseError> {
    let id = row
        .get(ICAO24)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(ParseError::MissingField("icao24"))?;

    let latitude = number(row, LATITUDE).ok_or(ParseError::MissingField("latitude"))?;
    let longitude = number(row, LONGITUDE).ok_or(ParseError::MissingField("longitude"))?;

    Ok(StateVector {
        id: id.to_string(),
        callsign: row.get(CALLSIGN).and_then(Value::as_str).map(str::to_string),
        latitude,
        longitude,
        altitude: number(row, BARO_ALTITUDE),
        ground_speed: number(row, VELOCITY),
        heading: number(row, TRUE_TRACK),
        vertical_rate: number(row, VERTICAL_RATE),
        on_ground: row.get(ON_GROUND).and_then(Value::as_bool).unwrap_or(false),
    })
}
