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

//! Flight position polling, classification, and dead reckoning.
//!
//! This library feeds a live traffic view. It fetches aircraft state vectors
//! around a center point, labels each aircraft with a flight phase, and
//! extrapolates positions between polls so markers move smoothly. When the
//! upstream provider is slow, rate limited, or down, it quietly substitutes
//! deterministic synthetic traffic so the view never goes blank.
//!
//! The layers can be used independently or composed together:
//!
//! - **Model**: [`Flight`], [`FlightPhase`], [`FlightBatch`]
//! - **Classification**: [`PhaseClassifier`] with tunable [`PhaseThresholds`]
//! - **Protocol**: OpenSky payload parsing into [`StateVector`]s
//! - **Sources**: [`FlightSource`] implemented by [`PollingCache`] (live data
//!   with caching and backoff) and [`SyntheticFlightGenerator`]
//! - **Tracking**: [`FlightTracker`] for dead reckoning, trails, and filtering
//! - **Tasks**: [`Poller`] running the poll and frame loops
//!
//! # Quick Start
//!
//! Use [`TrafficClient`] for full-stack operation:
//!
//! ```no_run
//! use flight_engine::{ClientConfig, Coordinate, TrafficClient};
//! use std::time::Duration;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let client = TrafficClient::spawn(ClientConfig {
//!         center: Coordinate::new(41.9742, -87.9073),
//!         ..Default::default()
//!     })
//!     .expect("failed to build HTTP client");
//!
//!     loop {
//!         for tracked in client.visible_flights() {
//!             println!("{} {} {}", tracked.flight.callsign, tracked.flight.phase, tracked.flight.position);
//!         }
//!         tokio::time::sleep(Duration::from_secs(1)).await;
//!     }
//! }
//! ```
//!
//! # Using Individual Layers
//!
//! ## Classification Only
//!
//! ```
//! use flight_engine::{Coordinate, Flight, FlightPhase, PhaseClassifier};
//!
//! let flight = Flight {
//!     id: "a1b2c3".to_string(),
//!     callsign: "UAL123".to_string(),
//!     position: Coordinate::new(41.97, -87.90),
//!     altitude: 3000.0,
//!     ground_speed: 80.0,
//!     heading: 270.0,
//!     vertical_rate: 0.0,
//!     on_ground: false,
//!     phase: FlightPhase::Cruising,
//! };
//! assert_eq!(PhaseClassifier::default().classify(&flight), FlightPhase::Holding);
//! ```
//!
//! ## Tracker Only
//!
//! ```
//! use flight_engine::{Coordinate, DataOrigin, FlightBatch, FlightTracker, SyntheticFlightGenerator};
//! use std::time::Duration;
//!
//! let flights = SyntheticFlightGenerator::default().generate(Coordinate::new(41.97, -87.90));
//! let mut tracker = FlightTracker::default();
//! tracker.ingest(&FlightBatch::new(flights, DataOrigin::Synthetic));
//! tracker.advance(Duration::from_millis(16));
//!
//! println!("Tracking {} flights", tracker.len());
//! ```

pub mod cache;
pub mod flight;
pub mod phase;
pub mod poller;
pub mod protocol;
pub mod source;
pub mod tracker;

use std::sync::{Arc, RwLock};
use std::time::Duration;

use log::info;
use tokio::sync::broadcast;

pub use cache::{CacheConfig, PollingCache};
pub use flight::{
    normalize_heading, BoundingBox, Coordinate, DataOrigin, Flight, FlightBatch, FlightPhase,
};
pub use phase::{classify, PhaseClassifier, PhaseThresholds};
pub use poller::{Poller, PollerConfig};
pub use protocol::{OpenSkyParser, ParseError, Protocol, StateVector};
pub use source::{
    FetchError, FlightSource, OpenSkySource, StateVectorSource, SyntheticFlightGenerator,
    OPENSKY_STATES_URL,
};
pub use tracker::{
    extrapolate, FlightTracker, PositionHistory, TrackedFlight, TrackerConfig, TrackerEvent,
    ViewFilter,
};

/// Where the client gets its flights.
#[derive(Debug, Clone)]
pub enum SourceMode {
    /// Poll an OpenSky-compatible endpoint, falling back to synthetic data.
    Live {
        url: String,
        /// Optional `(username, password)` for authenticated quota.
        credentials: Option<(String, String)>,
    },
    /// Never touch the network.
    Synthetic,
}

impl Default for SourceMode {
    fn default() -> Self {
        SourceMode::Live {
            url: OPENSKY_STATES_URL.to_string(),
            credentials: None,
        }
    }
}

/// Configuration for the full-stack client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Initial polling center.
    pub center: Coordinate,
    pub source: SourceMode,
    pub cache: CacheConfig,
    pub thresholds: PhaseThresholds,
    pub tracker: TrackerConfig,
    pub poller: PollerConfig,
    /// Initial view filter.
    pub filter: ViewFilter,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            center: Coordinate::new(41.9742, -87.9073),
            source: SourceMode::default(),
            cache: CacheConfig::default(),
            thresholds: PhaseThresholds::default(),
            tracker: TrackerConfig::default(),
            poller: PollerConfig::default(),
            filter: ViewFilter::default(),
        }
    }
}

/// Full-stack traffic client that wires all layers together.
///
/// The client owns a flight source, a tracker, and the background poll and
/// frame tasks. Readers get snapshots of the tracker; nothing returned here
/// borrows the live buffer.
pub struct TrafficClient {
    tracker: Arc<RwLock<FlightTracker>>,
    poller: Poller,
}

impl std::fmt::Debug for TrafficClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrafficClient")
            .field("poller", &self.poller)
            .finish_non_exhaustive()
    }
}

impl TrafficClient {
    /// Build the source and spawn the background tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: ClientConfig) -> Result<Self, FetchError> {
        let classifier = PhaseClassifier::new(config.thresholds);

        let source: Arc<dyn FlightSource> = match config.source {
            SourceMode::Live { url, credentials } => {
                info!("Polling {} every {}s", url, config.poller.poll_interval.as_secs());
                // Transport ceiling sits above the cache deadline, which does the real cutoff
                let upstream = OpenSkySource::new(
                    url,
                    config.cache.request_timeout + Duration::from_secs(1),
                    credentials,
                )?;
                Arc::new(PollingCache::new(upstream, classifier, config.cache))
            }
            SourceMode::Synthetic => {
                info!("Running on synthetic traffic only");
                Arc::new(SyntheticFlightGenerator::new(classifier))
            }
        };

        Ok(Self::with_source(source, config.center, config.tracker, config.poller, config.filter))
    }

    /// Spawn the background tasks over an existing source.
    #[must_use]
    pub fn with_source(
        source: Arc<dyn FlightSource>,
        center: Coordinate,
        tracker_config: TrackerConfig,
        poller_config: PollerConfig,
        filter: ViewFilter,
    ) -> Self {
        let mut tracker = FlightTracker::new(tracker_config);
        tracker.set_filter(filter);
        let tracker = Arc::new(RwLock::new(tracker));
        let poller = Poller::spawn(source, Arc::clone(&tracker), center, poller_config);

        Self { tracker, poller }
    }

    /// Snapshot of flights passing the current view filter, sorted by id.
    #[must_use]
    pub fn visible_flights(&self) -> Vec<TrackedFlight> {
        self.tracker
            .read()
            .map(|t| t.visible().into_iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of a single flight by id, ignoring the filter.
    #[must_use]
    pub fn get_by_id(&self, id: &str) -> Option<TrackedFlight> {
        self.tracker
            .read()
            .ok()
            .and_then(|t| t.get_by_id(id).cloned())
    }

    /// Search by callsign or id, ignoring the filter.
    #[must_use]
    pub fn find(&self, query: &str) -> Option<TrackedFlight> {
        self.tracker.read().ok().and_then(|t| t.find(query).cloned())
    }

    /// Number of tracked flights, filtered or not.
    #[must_use]
    pub fn flight_count(&self) -> usize {
        self.tracker.read().map(|t| t.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn phase_counts(&self) -> Vec<(FlightPhase, usize)> {
        self.tracker.read().map(|t| t.phase_counts()).unwrap_or_default()
    }

    /// Origin of the flights currently tracked.
    #[must_use]
    pub fn origin(&self) -> Option<DataOrigin> {
        self.tracker.read().ok().and_then(|t| t.origin())
    }

    pub fn set_filter(&self, filter: ViewFilter) {
        if let Ok(mut tracker) = self.tracker.write() {
            tracker.set_filter(filter);
        }
    }

    #[must_use]
    pub fn filter(&self) -> ViewFilter {
        self.tracker.read().map(|t| t.filter()).unwrap_or_default()
    }

    /// Move the center. Tracked flights are cleared and re-polled at once.
    pub fn set_center(&self, center: Coordinate) {
        self.poller.set_center(center);
    }

    #[must_use]
    pub fn center(&self) -> Coordinate {
        self.poller.center()
    }

    /// Subscribe to tracker events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.tracker
            .read()
            .map(|t| t.subscribe())
            .unwrap_or_else(|_| {
                let (tx, rx) = broadcast::channel(1);
                drop(tx);
                rx
            })
    }

    /// Stop the background tasks.
    pub fn shutdown(&self) {
        self.poller.shutdown();
    }
}
