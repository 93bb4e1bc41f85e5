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

//! Time-windowed cache and backoff in front of the upstream source.
//!
//! Each [`PollingCache::fetch_flights`] call resolves in this order:
//!
//! 1. Rate limited and still inside the backoff window → synthetic flights,
//!    no network I/O.
//! 2. A successful fetch for the same center inside the cache window → the
//!    cached list, by reference.
//! 3. Otherwise one upstream request under a hard deadline. Any failure
//!    degrades to synthetic flights; only HTTP 429 arms the backoff, and any
//!    2xx answer clears it, even one with no usable flights.
//!
//! The state lock is never held across the request, so concurrent callers
//! share one cache and always re-check the time windows themselves.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::flight::{BoundingBox, Coordinate, DataOrigin, Flight, FlightBatch};
use crate::phase::PhaseClassifier;
use crate::protocol::{OpenSkyParser, Protocol};
use crate::source::{FetchError, FlightSource, StateVectorSource, SyntheticFlightGenerator};

/// Configuration for [`PollingCache`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long a successful fetch is served without a new request.
    pub cache_window: Duration,
    /// How long to stay off the network after HTTP 429.
    pub backoff_window: Duration,
    /// Hard deadline for one upstream request.
    pub request_timeout: Duration,
    /// Upper bound on flights parsed from one response.
    pub max_flights: usize,
    /// Half-width of the query box in degrees.
    pub bbox_half_span: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_window: Duration::from_secs(15),
            backoff_window: Duration::from_secs(60),
            request_timeout: Duration::from_secs(5),
            max_flights: 50,
            bbox_half_span: 0.35,
        }
    }
}

#[derive(Debug, Default)]
struct CacheState {
    /// Start of the most recent upstream attempt, successful or not.
    last_fetch_time: Option<Instant>,
    cached_at: Option<Instant>,
    cached_center: Option<Coordinate>,
    cached_flights: Option<Arc<Vec<Flight>>>,
    is_rate_limited: bool,
}

enum Decision {
    Backoff,
    Cached(Arc<Vec<Flight>>),
    Fetch,
}

/// Caching, rate-limit-aware [`FlightSource`] over a [`StateVectorSource`].
pub struct PollingCache<S> {
    upstream: S,
    fallback: SyntheticFlightGenerator,
    classifier: PhaseClassifier,
    config: CacheConfig,
    state: Mutex<CacheState>,
    shutdown: CancellationToken,
}

impl<S> std::fmt::Debug for PollingCache<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingCache")
            .field("config", &self.config)
            .field("state", &*self.state())
            .finish_non_exhaustive()
    }
}

impl<S> PollingCache<S> {
    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: StateVectorSource> PollingCache<S> {
    /// Wrap `upstream`; failures fall back to a generator using the same classifier.
    #[must_use]
    pub fn new(upstream: S, classifier: PhaseClassifier, config: CacheConfig) -> Self {
        Self {
            upstream,
            fallback: SyntheticFlightGenerator::new(classifier),
            classifier,
            config,
            state: Mutex::new(CacheState::default()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Whether the last upstream response was HTTP 429.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        self.state().is_rate_limited
    }

    fn decide(&self, center: Coordinate, now: Instant) -> Decision {
        let state = self.state();

        if state.is_rate_limited {
            if let Some(last) = state.last_fetch_time {
                if now.duration_since(last) < self.config.backoff_window {
                    return Decision::Backoff;
                }
            }
        }

        if let (Some(cached_at), Some(flights)) = (state.cached_at, &state.cached_flights) {
            if state.cached_center == Some(center)
                && now.duration_since(cached_at) < self.config.cache_window
                && !flights.is_empty()
            {
                return Decision::Cached(Arc::clone(flights));
            }
        }

        Decision::Fetch
    }

    async fn request(&self, bbox: BoundingBox) -> Result<Vec<u8>, FetchError> {
        let cancel = self.shutdown.child_token();
        let fetch = self.upstream.fetch_states(bbox, cancel.clone());

        tokio::select! {
            result = fetch => result,
            () = tokio::time::sleep(self.config.request_timeout) => {
                cancel.cancel();
                Err(FetchError::Timeout)
            }
        }
    }

    fn parse(&self, body: &[u8]) -> Result<Vec<Flight>, FetchError> {
        let mut parser = OpenSkyParser::new(self.config.max_flights);
        let states = parser.parse(body)?.ok_or(FetchError::Empty)?;
        if states.is_empty() {
            return Err(FetchError::Empty);
        }
        Ok(states
            .into_iter()
            .map(|s| s.into_flight(&self.classifier))
            .collect())
    }

    fn synthetic(&self, center: Coordinate) -> FlightBatch {
        FlightBatch::new(self.fallback.generate(center), DataOrigin::Synthetic)
    }
}

#[async_trait]
impl<S: StateVectorSource> FlightSource for PollingCache<S> {
    async fn fetch_flights(&self, center: Coordinate) -> FlightBatch {
        let now = Instant::now();

        match self.decide(center, now) {
            Decision::Backoff => {
                debug!("Rate limited, serving synthetic flights without a request");
                return self.synthetic(center);
            }
            Decision::Cached(flights) => {
                debug!("Serving {} cached flights", flights.len());
                return FlightBatch {
                    flights,
                    origin: DataOrigin::Cached,
                };
            }
            Decision::Fetch => {}
        }

        let bbox = BoundingBox::around(center, self.config.bbox_half_span);
        // Outer error: the request failed. Inner error: it answered 2xx with nothing usable.
        let result = self.request(bbox).await.map(|body| self.parse(&body));

        let mut state = self.state();
        state.last_fetch_time = Some(now);

        match result {
            Ok(parsed) => {
                state.is_rate_limited = false;
                match parsed {
                    Ok(flights) => {
                        info!("Fetched {} live flights around {}", flights.len(), center);
                        let flights = Arc::new(flights);
                        state.cached_at = Some(now);
                        state.cached_center = Some(center);
                        state.cached_flights = Some(Arc::clone(&flights));
                        FlightBatch {
                            flights,
                            origin: DataOrigin::Live,
                        }
                    }
                    Err(e) => {
                        warn!("Upstream answered without usable flights ({}), using simulation data", e);
                        drop(state);
                        self.synthetic(center)
                    }
                }
            }
            Err(FetchError::RateLimited) => {
                warn!(
                    "Upstream rate limit exceeded, switching to simulation for {}s",
                    self.config.backoff_window.as_secs()
                );
                state.is_rate_limited = true;
                drop(state);
                self.synthetic(center)
            }
            Err(e) => {
                warn!("Upstream unavailable ({}), using simulation data", e);
                drop(state);
                self.synthetic(center)
            }
        }
    }

    fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::flight::FlightPhase;

    const ORD: Coordinate = Coordinate::new(41.9742, -87.9073);

    const BODY: &str = r#"{"time":1700000000,"states":[
        ["a1b2c3","UAL123  ","United States",0,0,-87.9,41.98,3000.0,false,80.0,90.0,0.0],
        ["d4e5f6","DAL9","United States",0,0,-87.8,41.92,800.0,false,120.0,180.0,6.5],
        ["0a0b0c","","United States",0,0,-87.85,41.97,0.0,true,0.0,0.0,null]
    ]}"#;

    enum Reply {
        Body(&'static str),
        Fail(fn() -> FetchError),
        Hang,
    }

    /// Scripted upstream that counts requests. Replays the last reply once the script runs out.
    struct ScriptedSource {
        replies: Mutex<VecDeque<Reply>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(replies: Vec<Reply>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn next_reply(&self) -> Reply {
            let mut replies = self.replies.lock().unwrap();
            let reply = replies.pop_front().unwrap_or(Reply::Body(BODY));
            let replay = match &reply {
                Reply::Body(b) => Reply::Body(*b),
                Reply::Fail(f) => Reply::Fail(*f),
                Reply::Hang => Reply::Hang,
            };
            if replies.is_empty() {
                replies.push_back(replay);
            }
            reply
        }
    }

    #[async_trait]
    impl StateVectorSource for Arc<ScriptedSource> {
        async fn fetch_states(
            &self,
            _bbox: BoundingBox,
            cancel: CancellationToken,
        ) -> Result<Vec<u8>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.next_reply() {
                Reply::Body(body) => Ok(body.as_bytes().to_vec()),
                Reply::Fail(make) => Err(make()),
                Reply::Hang => {
                    cancel.cancelled().await;
                    Err(FetchError::Cancelled)
                }
            }
        }
    }

    fn cache(replies: Vec<Reply>) -> (PollingCache<Arc<ScriptedSource>>, Arc<ScriptedSource>) {
        let source = Arc::new(ScriptedSource::new(replies));
        let cache = PollingCache::new(
            Arc::clone(&source),
            PhaseClassifier::default(),
            CacheConfig::default(),
        );
        (cache, source)
    }

    fn calls(source: &ScriptedSource) -> usize {
        source.calls.load(Ordering::SeqCst)
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_fetch_classifies_flights() {
        let (cache, source) = cache(vec![Reply::Body(BODY)]);
        let batch = cache.fetch_flights(ORD).await;

        assert_eq!(batch.origin, DataOrigin::Live);
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.flights[0].phase, FlightPhase::Holding);
        assert_eq!(batch.flights[1].phase, FlightPhase::Departing);
        assert_eq!(batch.flights[2].phase, FlightPhase::Grounded);
        assert_eq!(batch.flights[2].callsign, "N/A");
        assert_eq!(calls(&source), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_call_within_window_is_cached() {
        let (cache, source) = cache(vec![Reply::Body(BODY)]);
        let first = cache.fetch_flights(ORD).await;
        tokio::time::advance(Duration::from_secs(10)).await;
        let second = cache.fetch_flights(ORD).await;

        assert_eq!(second.origin, DataOrigin::Cached);
        assert!(Arc::ptr_eq(&first.flights, &second.flights));
        assert_eq!(calls(&source), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_expires_after_window() {
        let (cache, source) = cache(vec![Reply::Body(BODY)]);
        let first = cache.fetch_flights(ORD).await;
        tokio::time::advance(Duration::from_secs(16)).await;
        let second = cache.fetch_flights(ORD).await;

        assert_eq!(second.origin, DataOrigin::Live);
        assert!(!Arc::ptr_eq(&first.flights, &second.flights));
        assert_eq!(calls(&source), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_center_change_bypasses_cache() {
        let (cache, source) = cache(vec![Reply::Body(BODY)]);
        cache.fetch_flights(ORD).await;
        let other = cache.fetch_flights(Coordinate::new(33.9425, -118.4081)).await;

        assert_eq!(other.origin, DataOrigin::Live);
        assert_eq!(calls(&source), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_backs_off_without_network() {
        let (cache, source) = cache(vec![Reply::Fail(|| FetchError::RateLimited), Reply::Body(BODY)]);

        let first = cache.fetch_flights(ORD).await;
        assert_eq!(first.origin, DataOrigin::Synthetic);
        assert!(cache.is_rate_limited());

        tokio::time::advance(Duration::from_secs(30)).await;
        let second = cache.fetch_flights(ORD).await;
        assert_eq!(second.origin, DataOrigin::Synthetic);
        assert_eq!(second.len(), 20);
        assert_eq!(calls(&source), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        let third = cache.fetch_flights(ORD).await;
        assert_eq!(third.origin, DataOrigin::Live);
        assert!(!cache.is_rate_limited());
        assert_eq!(calls(&source), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_success_clears_backoff() {
        let (cache, source) = cache(vec![
            Reply::Fail(|| FetchError::RateLimited),
            Reply::Body(r#"{"time":0,"states":null}"#),
            Reply::Body(BODY),
        ]);

        cache.fetch_flights(ORD).await;
        assert!(cache.is_rate_limited());

        tokio::time::advance(Duration::from_secs(61)).await;
        let quiet = cache.fetch_flights(ORD).await;
        assert_eq!(quiet.origin, DataOrigin::Synthetic);
        assert!(!cache.is_rate_limited());
        assert_eq!(calls(&source), 2);

        tokio::time::advance(Duration::from_secs(9)).await;
        let recovered = cache.fetch_flights(ORD).await;
        assert_eq!(recovered.origin, DataOrigin::Live);
        assert_eq!(calls(&source), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_does_not_arm_backoff() {
        let (cache, source) = cache(vec![
            Reply::Fail(|| FetchError::Transport("connection refused".to_string())),
            Reply::Body(BODY),
        ]);

        let first = cache.fetch_flights(ORD).await;
        assert_eq!(first.origin, DataOrigin::Synthetic);
        assert!(!cache.is_rate_limited());

        let second = cache.fetch_flights(ORD).await;
        assert_eq!(second.origin, DataOrigin::Live);
        assert_eq!(calls(&source), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_falls_back() {
        let (cache, _source) = cache(vec![Reply::Fail(|| FetchError::Status(503))]);
        let batch = cache.fetch_flights(ORD).await;
        assert_eq!(batch.origin, DataOrigin::Synthetic);
        assert!(!cache.is_rate_limited());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_cancels_request() {
        let (cache, source) = cache(vec![Reply::Hang]);
        let batch = cache.fetch_flights(ORD).await;

        assert_eq!(batch.origin, DataOrigin::Synthetic);
        assert_eq!(calls(&source), 1);
        assert!(!cache.is_rate_limited());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pending_request() {
        let (cache, source) = cache(vec![Reply::Hang]);
        cache.shutdown();

        let started = Instant::now();
        let batch = cache.fetch_flights(ORD).await;

        assert_eq!(batch.origin, DataOrigin::Synthetic);
        assert_eq!(calls(&source), 1);
        assert!(started.elapsed() < CacheConfig::default().request_timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_and_empty_payloads_fall_back() {
        let (cache, source) = cache(vec![
            Reply::Body("not json"),
            Reply::Body(r#"{"time":0,"states":null}"#),
            Reply::Body(r#"{"time":0,"states":[]}"#),
        ]);

        for _ in 0..3 {
            let batch = cache.fetch_flights(ORD).await;
            assert_eq!(batch.origin, DataOrigin::Synthetic);
        }
        // Nothing was cached, so every call went upstream
        assert_eq!(calls(&source), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_truncated_to_max_flights() {
        let rows: Vec<String> = (0..70)
            .map(|i| format!(r#"["id{i}","CS{i}","X",0,0,-87.9,41.9,3000.0,false,200.0,90.0,0.0]"#))
            .collect();
        let body: &'static str = Box::leak(format!(r#"{{"states":[{}]}}"#, rows.join(",")).into_boxed_str());

        let (cache, _source) = cache(vec![Reply::Body(body)]);
        let batch = cache.fetch_flights(ORD).await;
        assert_eq!(batch.len(), 50);
    }
}
