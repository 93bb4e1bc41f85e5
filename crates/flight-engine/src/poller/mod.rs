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

//! Background polling and animation tasks.
//!
//! Two tasks share one [`FlightTracker`]:
//!
//! - the poll loop asks a [`FlightSource`] for flights on a fixed interval
//!   and replaces the tracked set with each result;
//! - the frame loop advances every tracked flight by the wall-clock time
//!   since the previous frame.
//!
//! The two are unordered relative to each other. Neither holds the tracker
//! lock across an await, so a poll result can land between any two frames.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use log::{debug, info};
use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::flight::Coordinate;
use crate::source::FlightSource;
use crate::tracker::FlightTracker;

/// Cadence of the background tasks.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Time between flight fetches.
    pub poll_interval: Duration,
    /// Time between animation frames.
    pub frame_interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(8),
            frame_interval: Duration::from_millis(16),
        }
    }
}

/// Handle to the running poll and frame tasks.
///
/// Changing the center with [`Poller::set_center`] clears the tracker and
/// triggers an immediate poll. Dropping the handle stops both tasks.
pub struct Poller {
    center_tx: watch::Sender<Coordinate>,
    cancel_token: CancellationToken,
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("center", &*self.center_tx.borrow())
            .field("cancel_token", &self.cancel_token)
            .finish()
    }
}

impl Poller {
    /// Spawn both tasks on the current tokio runtime.
    #[must_use]
    pub fn spawn(
        source: Arc<dyn FlightSource>,
        tracker: Arc<RwLock<FlightTracker>>,
        center: Coordinate,
        config: PollerConfig,
    ) -> Self {
        let (center_tx, center_rx) = watch::channel(center);
        let cancel_token = CancellationToken::new();

        tokio::spawn(poll_loop(
            source,
            Arc::clone(&tracker),
            center_rx,
            cancel_token.clone(),
            config.poll_interval,
        ));
        tokio::spawn(frame_loop(tracker, cancel_token.clone(), config.frame_interval));

        Self {
            center_tx,
            cancel_token,
        }
    }

    /// Move the polling center.
    pub fn set_center(&self, center: Coordinate) {
        let _ = self.center_tx.send(center);
    }

    #[must_use]
    pub fn center(&self) -> Coordinate {
        *self.center_tx.borrow()
    }

    /// Stop both tasks.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

async fn poll_loop(
    source: Arc<dyn FlightSource>,
    tracker: Arc<RwLock<FlightTracker>>,
    mut center_rx: watch::Receiver<Coordinate>,
    cancel_token: CancellationToken,
    poll_interval: Duration,
) {
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = center_rx.changed() => {
                if changed.is_err() {
                    return;
                }
                info!("Center moved to {}, clearing tracked flights", *center_rx.borrow());
                if let Ok(mut tracker) = tracker.write() {
                    tracker.reset();
                }
                ticker.reset();
            }
            () = cancel_token.cancelled() => {
                info!("Poller cancelled");
                source.shutdown();
                return;
            }
        }

        let center = *center_rx.borrow_and_update();

        let batch = tokio::select! {
            batch = source.fetch_flights(center) => batch,
            () = cancel_token.cancelled() => {
                info!("Poller cancelled during fetch");
                source.shutdown();
                return;
            }
        };

        // A result for the old center must not land after the reset
        if center_rx.has_changed().unwrap_or(false) {
            debug!("Discarding {} flights fetched for previous center", batch.len());
            continue;
        }

        if let Ok(mut tracker) = tracker.write() {
            tracker.ingest(&batch);
        }
    }
}

async fn frame_loop(
    tracker: Arc<RwLock<FlightTracker>>,
    cancel_token: CancellationToken,
    frame_interval: Duration,
) {
    let mut ticker = interval(frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_frame = Instant::now();

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            () = cancel_token.cancelled() => return,
        }

        let now = Instant::now();
        let elapsed = now.duration_since(last_frame);
        last_frame = now;

        if let Ok(mut tracker) = tracker.write() {
            tracker.advance(elapsed);
        }
    }
}
