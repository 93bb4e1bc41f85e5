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

use std::fmt;

use chrono::{DateTime, Utc};
use flight_engine::{Coordinate, DataOrigin, FlightPhase, TrackedFlight, TrafficClient, ViewFilter};

/// Maximum flight rows printed per summary
const MAX_ROWS: usize = 12;

/// Point-in-time view of the traffic picture for terminal display
#[derive(Debug, Clone)]
pub struct TrafficSummary {
    pub timestamp: DateTime<Utc>,
    pub center: Coordinate,
    pub origin: Option<DataOrigin>,
    pub filter: ViewFilter,
    pub total: usize,
    pub phase_counts: Vec<(FlightPhase, usize)>,
    pub visible: Vec<TrackedFlight>,
}

impl TrafficSummary {
    pub fn capture(client: &TrafficClient) -> Self {
        Self {
            timestamp: Utc::now(),
            center: client.center(),
            origin: client.origin(),
            filter: client.filter(),
            total: client.flight_count(),
            phase_counts: client.phase_counts(),
            visible: client.visible_flights(),
        }
    }

    /// Whether the view is currently fed by synthetic traffic
    pub fn is_simulated(&self) -> bool {
        self.origin == Some(DataOrigin::Synthetic)
    }
}

impl fmt::Display for TrafficSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let origin = self
            .origin
            .map_or_else(|| "waiting".to_string(), |o| o.to_string());

        writeln!(
            f,
            "[{}] {} flights around {} ({}{}), filter: {}",
            self.timestamp.format("%H:%M:%S"),
            self.total,
            self.center,
            origin,
            if self.is_simulated() { ", SIMULATION MODE" } else { "" },
            self.filter,
        )?;

        let counts: Vec<String> = self
            .phase_counts
            .iter()
            .filter(|(_, n)| *n > 0)
            .map(|(phase, n)| format!("{phase}: {n}"))
            .collect();
        if !counts.is_empty() {
            writeln!(f, "  {}", counts.join("  "))?;
        }

        for tracked in self.visible.iter().take(MAX_ROWS) {
            let flight = &tracked.flight;
            writeln!(
                f,
                "  {:<10} {:<8} {:<10} {:>6.0}m {:>5.0}m/s {:>4.0}° {:+5.1}m/s  {}  trail {}",
                flight.id,
                flight.callsign,
                flight.phase,
                flight.altitude,
                flight.ground_speed,
                flight.heading,
                flight.vertical_rate,
                flight.position,
                tracked.history.len(),
            )?;
        }
        if self.visible.len() > MAX_ROWS {
            writeln!(f, "  ... {} more", self.visible.len() - MAX_ROWS)?;
        }

        Ok(())
    }
}

/// One-line description of a searched flight and its trail.
pub fn track_line(tracked: &TrackedFlight) -> String {
    let flight = &tracked.flight;
    let trail = tracked.history.to_vec();

    match (trail.first(), tracked.history.latest()) {
        (Some(first), Some(last)) => format!(
            "  tracking {} ({}, {}) trail of {} fixes from {} to {}",
            flight.callsign,
            flight.id,
            flight.phase,
            trail.len(),
            first,
            last,
        ),
        _ => format!(
            "  tracking {} ({}, {}) at {}, no trail yet",
            flight.callsign, flight.id, flight.phase, flight.position,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flight_engine::{FlightBatch, FlightTracker, PositionHistory, SyntheticFlightGenerator};

    fn summary(origin: Option<DataOrigin>) -> TrafficSummary {
        let flights = SyntheticFlightGenerator::default()
            .generate_at(Coordinate::new(41.9742, -87.9073), 1_700_000_000.0);
        let mut tracker = FlightTracker::default();
        tracker.ingest(&FlightBatch::new(flights, DataOrigin::Synthetic));

        TrafficSummary {
            timestamp: Utc::now(),
            center: Coordinate::new(41.9742, -87.9073),
            origin,
            filter: ViewFilter::All,
            total: tracker.len(),
            phase_counts: tracker.phase_counts(),
            visible: tracker.visible().into_iter().cloned().collect(),
        }
    }

    #[test]
    fn test_display_marks_simulation() {
        let text = summary(Some(DataOrigin::Synthetic)).to_string();
        assert!(text.contains("20 flights"));
        assert!(text.contains("SIMULATION MODE"));
        assert!(text.contains("grounded: 4"));
        assert!(text.contains("... 8 more"));
    }

    #[test]
    fn test_display_before_first_poll() {
        let mut s = summary(None);
        s.visible.truncate(1);
        s.visible[0].history = PositionHistory::default();
        let text = s.to_string();
        assert!(text.contains("waiting"));
        assert!(!text.contains("SIMULATION"));
        assert!(text.contains("trail 0"));
    }

    #[test]
    fn test_track_line_reports_trail_ends() {
        let mut tracked = summary(None).visible.remove(0);
        assert!(track_line(&tracked).contains("no trail yet"));

        tracked.history.push(Coordinate::new(41.0, -87.0));
        tracked.history.push(Coordinate::new(41.5, -87.5));
        let line = track_line(&tracked);
        assert!(line.contains("trail of 2 fixes from 41.0000, -87.0000 to 41.5000, -87.5000"));
        assert!(line.contains("sim-0"));
    }
}
