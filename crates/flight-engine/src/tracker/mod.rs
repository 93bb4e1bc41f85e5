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

//! Flight tracking and dead reckoning.
//!
//! The tracker owns the live flight buffer. Poll results replace the buffer
//! wholesale; between polls [`FlightTracker::advance`] moves every flight
//! along its heading with a flat-earth approximation and appends the result
//! to its trail. Extrapolated positions never feed back into classification.

mod history;

pub use history::{PositionHistory, DEFAULT_HISTORY_LEN};

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::sync::broadcast;

use crate::flight::{Coordinate, DataOrigin, Flight, FlightBatch, FlightPhase};

const METERS_PER_DEGREE_LAT: f64 = 111_111.0;

/// Advance `position` by `dt_secs` at constant speed and heading.
///
/// Uses a flat-earth approximation, which is adequate for the few seconds
/// between polls but ignores great-circle curvature.
#[must_use]
pub fn extrapolate(position: Coordinate, ground_speed: f64, heading: f64, dt_secs: f64) -> Coordinate {
    let heading_rad = heading.to_radians();
    let v_lat = ground_speed * heading_rad.cos();
    let v_lng = ground_speed * heading_rad.sin();

    let meters_per_degree_lng = METERS_PER_DEGREE_LAT * position.latitude.to_radians().cos();

    let latitude = position.latitude + v_lat * dt_secs / METERS_PER_DEGREE_LAT;
    // Longitude is undefined at the poles
    let longitude = if meters_per_degree_lng.abs() > 1e-6 {
        position.longitude + v_lng * dt_secs / meters_per_degree_lng
    } else {
        position.longitude
    };

    Coordinate::new(latitude, longitude)
}

/// Which flights the consumer wants to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewFilter {
    #[default]
    All,
    Airborne,
    Ground,
    Phase(FlightPhase),
}

impl ViewFilter {
    #[must_use]
    pub fn matches(&self, flight: &Flight) -> bool {
        match self {
            ViewFilter::All => true,
            ViewFilter::Airborne => !flight.on_ground,
            ViewFilter::Ground => flight.on_ground,
            ViewFilter::Phase(phase) => flight.phase == *phase,
        }
    }
}

impl fmt::Display for ViewFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewFilter::All => f.write_str("all"),
            ViewFilter::Airborne => f.write_str("air"),
            ViewFilter::Ground => f.write_str("ground"),
            ViewFilter::Phase(phase) => write!(f, "{phase}"),
        }
    }
}

impl FromStr for ViewFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "all" => return Ok(ViewFilter::All),
            "air" | "airborne" => return Ok(ViewFilter::Airborne),
            "gnd" | "ground" => return Ok(ViewFilter::Ground),
            _ => {}
        }
        FlightPhase::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .map(ViewFilter::Phase)
            .ok_or_else(|| format!("unknown view filter '{s}'"))
    }
}

/// A flight plus its trail.
#[derive(Debug, Clone)]
pub struct TrackedFlight {
    pub flight: Flight,
    pub history: PositionHistory,
}

/// Events emitted by the tracker when the flight set changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent {
    /// A flight appeared in a poll result.
    FlightAdded(String),
    /// A flight present in the previous poll received fresh telemetry.
    FlightUpdated(String),
    /// A flight was absent from the latest poll result.
    FlightRemoved(String),
}

/// Configuration for the flight tracker.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Trail samples kept per flight.
    pub history_len: usize,
    /// Largest time step applied by one `advance` call.
    pub max_step: Duration,
    /// Broadcast channel capacity for events.
    pub event_channel_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            history_len: DEFAULT_HISTORY_LEN,
            max_step: Duration::from_millis(500),
            event_channel_capacity: 256,
        }
    }
}

/// Holds the current flight set and advances it every frame.
pub struct FlightTracker {
    flights: HashMap<String, TrackedFlight>,
    last_batch: Option<Arc<Vec<Flight>>>,
    origin: Option<DataOrigin>,
    filter: ViewFilter,
    history_len: usize,
    max_step: Duration,
    event_tx: broadcast::Sender<TrackerEvent>,
}

impl fmt::Debug for FlightTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlightTracker")
            .field("flight_count", &self.flights.len())
            .field("origin", &self.origin)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

impl Default for FlightTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl FlightTracker {
    #[must_use]
    pub fn new(config: TrackerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));

        Self {
            flights: HashMap::new(),
            last_batch: None,
            origin: None,
            filter: ViewFilter::default(),
            history_len: config.history_len,
            max_step: config.max_step,
            event_tx,
        }
    }

    /// Replace the tracked set with a poll result.
    ///
    /// Flights that survive keep their trail; flights missing from the batch
    /// are dropped. Re-ingesting the exact batch already applied (a cache
    /// hit) is a no-op so extrapolated positions don't snap back. Returns
    /// whether the batch was applied.
    pub fn ingest(&mut self, batch: &FlightBatch) -> bool {
        if let Some(last) = &self.last_batch {
            if Arc::ptr_eq(last, &batch.flights) {
                self.origin = Some(batch.origin);
                return false;
            }
        }

        let mut previous = std::mem::take(&mut self.flights);
        let mut events = Vec::new();

        for flight in batch.flights.iter() {
            if self.flights.contains_key(&flight.id) {
                continue;
            }
            let history = match previous.remove(&flight.id) {
                Some(tracked) => {
                    events.push(TrackerEvent::FlightUpdated(flight.id.clone()));
                    tracked.history
                }
                None => {
                    events.push(TrackerEvent::FlightAdded(flight.id.clone()));
                    PositionHistory::with_capacity(self.history_len)
                }
            };
            self.flights.insert(
                flight.id.clone(),
                TrackedFlight {
                    flight: flight.clone(),
                    history,
                },
            );
        }

        events.extend(previous.into_keys().map(TrackerEvent::FlightRemoved));

        debug!(
            "Ingested {} {} flights ({} events)",
            batch.len(),
            batch.origin,
            events.len()
        );

        self.last_batch = Some(Arc::clone(&batch.flights));
        self.origin = Some(batch.origin);
        for event in events {
            let _ = self.event_tx.send(event);
        }
        true
    }

    /// Advance every tracked flight by `elapsed`, clamped to the max step.
    ///
    /// Flights hidden by the view filter advance too, so their trail is
    /// intact when they become visible again.
    pub fn advance(&mut self, elapsed: Duration) {
        let dt = elapsed.min(self.max_step).as_secs_f64();
        if dt <= 0.0 {
            return;
        }

        for tracked in self.flights.values_mut() {
            let flight = &mut tracked.flight;
            flight.position = extrapolate(flight.position, flight.ground_speed, flight.heading, dt);
            tracked.history.push(flight.position);
        }
    }

    /// Drop every flight and trail, e.g. when the view center moves.
    pub fn reset(&mut self) {
        self.flights.clear();
        self.last_batch = None;
        self.origin = None;
    }

    pub fn set_filter(&mut self, filter: ViewFilter) {
        self.filter = filter;
    }

    #[must_use]
    pub fn filter(&self) -> ViewFilter {
        self.filter
    }

    /// Origin of the batch currently being tracked.
    #[must_use]
    pub fn origin(&self) -> Option<DataOrigin> {
        self.origin
    }

    /// Flights passing the view filter, sorted by id.
    #[must_use]
    pub fn visible(&self) -> Vec<&TrackedFlight> {
        let mut visible: Vec<_> = self
            .flights
            .values()
            .filter(|t| self.filter.matches(&t.flight))
            .collect();
        visible.sort_by(|a, b| a.flight.id.cmp(&b.flight.id));
        visible
    }

    /// Every tracked flight regardless of filter.
    #[must_use]
    pub fn get_flights(&self) -> Vec<&TrackedFlight> {
        self.flights.values().collect()
    }

    #[must_use]
    pub fn get_by_id(&self, id: &str) -> Option<&TrackedFlight> {
        self.flights.get(id)
    }

    /// First flight (by id) whose callsign or id contains `query`.
    #[must_use]
    pub fn find(&self, query: &str) -> Option<&TrackedFlight> {
        self.flights
            .values()
            .filter(|t| t.flight.matches_query(query))
            .min_by(|a, b| a.flight.id.cmp(&b.flight.id))
    }

    /// Tracked flight count per phase, in [`FlightPhase::ALL`] order.
    #[must_use]
    pub fn phase_counts(&self) -> Vec<(FlightPhase, usize)> {
        FlightPhase::ALL
            .into_iter()
            .map(|phase| {
                let count = self.flights.values().filter(|t| t.flight.phase == phase).count();
                (phase, count)
            })
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.flights.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.event_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flight(id: &str, heading: f64, ground_speed: f64, on_ground: bool) -> Flight {
        Flight {
            id: id.to_string(),
            callsign: format!("CS{id}"),
            position: Coordinate::new(41.9742, -87.9073),
            altitude: if on_ground { 0.0 } else { 3000.0 },
            ground_speed,
            heading,
            vertical_rate: 0.0,
            on_ground,
            phase: if on_ground { FlightPhase::Grounded } else { FlightPhase::Cruising },
        }
    }

    fn batch(flights: Vec<Flight>) -> FlightBatch {
        FlightBatch::new(flights, DataOrigin::Live)
    }

    #[test]
    fn test_extrapolate_north_and_east() {
        let start = Coordinate::new(0.0, 0.0);
        let north = extrapolate(start, 111.111, 0.0, 10.0);
        assert!((north.latitude - 0.01).abs() < 1e-12);
        assert!(north.longitude.abs() < 1e-12);

        let east = extrapolate(start, 111.111, 90.0, 10.0);
        assert!(east.latitude.abs() < 1e-12);
        assert!((east.longitude - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_extrapolate_longitude_scales_with_latitude() {
        let east = extrapolate(Coordinate::new(60.0, 0.0), 111.111, 90.0, 10.0);
        // cos(60°) = 0.5, so a degree of longitude is half as long
        assert!((east.longitude - 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_extrapolate_one_step_matches_two_half_steps() {
        let start = Coordinate::new(41.9742, -87.9073);
        for heading in [0.0, 45.0, 135.0, 270.0, 333.3] {
            let once = extrapolate(start, 200.0, heading, 10.0);
            let half = extrapolate(start, 200.0, heading, 5.0);
            let twice = extrapolate(half, 200.0, heading, 5.0);
            assert!((once.latitude - twice.latitude).abs() < 1e-9);
            assert!((once.longitude - twice.longitude).abs() < 1e-5);
        }
    }

    #[test]
    fn test_extrapolate_at_pole_keeps_longitude() {
        let at_pole = extrapolate(Coordinate::new(90.0, 10.0), 200.0, 90.0, 1.0);
        assert!(at_pole.longitude.is_finite());
    }

    #[test]
    fn test_advance_clamps_large_steps() {
        let mut tracker = FlightTracker::default();
        tracker.ingest(&batch(vec![flight("a", 90.0, 200.0, false)]));
        let start = tracker.get_by_id("a").unwrap().flight.position;

        tracker.advance(Duration::from_secs(30));

        let expected = extrapolate(start, 200.0, 90.0, 0.5);
        let moved = tracker.get_by_id("a").unwrap().flight.position;
        assert!((moved.longitude - expected.longitude).abs() < 1e-12);
    }

    #[test]
    fn test_advance_bounds_history() {
        let mut tracker = FlightTracker::default();
        tracker.ingest(&batch(vec![flight("a", 45.0, 250.0, false), flight("b", 180.0, 90.0, false)]));

        for _ in 0..1000 {
            tracker.advance(Duration::from_millis(16));
        }

        for tracked in tracker.get_flights() {
            assert_eq!(tracked.history.len(), DEFAULT_HISTORY_LEN);
            assert_eq!(tracked.history.latest(), Some(tracked.flight.position));
        }
    }

    #[test]
    fn test_ingest_adds_updates_and_removes() {
        let mut tracker = FlightTracker::default();
        let mut events = tracker.subscribe();

        tracker.ingest(&batch(vec![flight("a", 0.0, 100.0, false), flight("b", 0.0, 100.0, false)]));
        tracker.advance(Duration::from_millis(100));
        tracker.ingest(&batch(vec![flight("b", 0.0, 100.0, false), flight("c", 0.0, 100.0, false)]));

        assert_eq!(tracker.len(), 2);
        assert!(tracker.get_by_id("a").is_none());
        // Surviving flight keeps its trail, newcomer starts empty
        assert_eq!(tracker.get_by_id("b").unwrap().history.len(), 1);
        assert!(tracker.get_by_id("c").unwrap().history.is_empty());

        let mut received = Vec::new();
        while let Ok(event) = events.try_recv() {
            received.push(event);
        }
        assert!(received.contains(&TrackerEvent::FlightAdded("a".to_string())));
        assert!(received.contains(&TrackerEvent::FlightUpdated("b".to_string())));
        assert!(received.contains(&TrackerEvent::FlightAdded("c".to_string())));
        assert!(received.contains(&TrackerEvent::FlightRemoved("a".to_string())));
    }

    #[test]
    fn test_ingest_replaces_telemetry_and_position() {
        let mut tracker = FlightTracker::default();
        tracker.ingest(&batch(vec![flight("a", 0.0, 100.0, false)]));
        tracker.advance(Duration::from_millis(400));

        let mut fresh = flight("a", 180.0, 80.0, false);
        fresh.phase = FlightPhase::Holding;
        tracker.ingest(&batch(vec![fresh.clone()]));

        let tracked = tracker.get_by_id("a").unwrap();
        assert_eq!(tracked.flight, fresh);
    }

    #[test]
    fn test_ingest_same_batch_is_noop() {
        let mut tracker = FlightTracker::default();
        let first = batch(vec![flight("a", 90.0, 200.0, false)]);
        assert!(tracker.ingest(&first));
        tracker.advance(Duration::from_millis(500));
        let advanced = tracker.get_by_id("a").unwrap().flight.position;

        let cached = FlightBatch {
            flights: Arc::clone(&first.flights),
            origin: DataOrigin::Cached,
        };
        assert!(!tracker.ingest(&cached));
        assert_eq!(tracker.get_by_id("a").unwrap().flight.position, advanced);
        assert_eq!(tracker.origin(), Some(DataOrigin::Cached));
    }

    #[test]
    fn test_ingest_ignores_duplicate_ids() {
        let mut tracker = FlightTracker::default();
        let mut dup = flight("a", 0.0, 50.0, false);
        dup.callsign = "SECOND".to_string();
        tracker.ingest(&batch(vec![flight("a", 0.0, 100.0, false), dup]));
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.get_by_id("a").unwrap().flight.callsign, "CSa");
    }

    #[test]
    fn test_filtered_flights_keep_advancing() {
        let mut tracker = FlightTracker::default();
        tracker.ingest(&batch(vec![flight("air", 90.0, 200.0, false), flight("gnd", 0.0, 5.0, true)]));

        tracker.set_filter(ViewFilter::Ground);
        assert_eq!(tracker.visible().len(), 1);
        assert_eq!(tracker.visible()[0].flight.id, "gnd");

        for _ in 0..5 {
            tracker.advance(Duration::from_millis(100));
        }

        tracker.set_filter(ViewFilter::All);
        let air = tracker.get_by_id("air").unwrap();
        assert_eq!(air.history.len(), 5);
        assert_eq!(tracker.visible().len(), 2);
    }

    #[test]
    fn test_phase_filter() {
        let mut tracker = FlightTracker::default();
        let mut holding = flight("h", 0.0, 80.0, false);
        holding.phase = FlightPhase::Holding;
        tracker.ingest(&batch(vec![holding, flight("c", 0.0, 200.0, false)]));

        tracker.set_filter(ViewFilter::Phase(FlightPhase::Holding));
        let visible = tracker.visible();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].flight.id, "h");
    }

    #[test]
    fn test_view_filter_from_str() {
        assert_eq!("ALL".parse::<ViewFilter>().unwrap(), ViewFilter::All);
        assert_eq!("air".parse::<ViewFilter>().unwrap(), ViewFilter::Airborne);
        assert_eq!("gnd".parse::<ViewFilter>().unwrap(), ViewFilter::Ground);
        assert_eq!(
            "holding".parse::<ViewFilter>().unwrap(),
            ViewFilter::Phase(FlightPhase::Holding)
        );
        assert!("taxiing".parse::<ViewFilter>().is_err());
    }

    #[test]
    fn test_find_by_callsign() {
        let mut tracker = FlightTracker::default();
        tracker.ingest(&batch(vec![flight("abc", 0.0, 100.0, false), flight("def", 0.0, 100.0, false)]));
        assert_eq!(tracker.find("csd").unwrap().flight.id, "def");
        assert!(tracker.find("zzz").is_none());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut tracker = FlightTracker::default();
        tracker.ingest(&batch(vec![flight("a", 0.0, 100.0, false)]));
        tracker.advance(Duration::from_millis(100));
        tracker.reset();
        assert!(tracker.is_empty());
        assert!(tracker.origin().is_none());
    }

    #[test]
    fn test_phase_counts() {
        let mut tracker = FlightTracker::default();
        tracker.ingest(&batch(vec![
            flight("a", 0.0, 100.0, true),
            flight("b", 0.0, 100.0, true),
            flight("c", 0.0, 200.0, false),
        ]));
        let counts = tracker.phase_counts();
        assert_eq!(counts[0], (FlightPhase::Grounded, 2));
        assert_eq!(counts[6], (FlightPhase::Cruising, 1));
    }
}
