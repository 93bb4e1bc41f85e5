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

//! Flight data sources.
//!
//! Two traits live here:
//!
//! - [`FlightSource`] is what consumers poll. It always yields a batch and
//!   never fails; [`PollingCache`](crate::cache::PollingCache) and
//!   [`SyntheticFlightGenerator`] both implement it.
//! - [`StateVectorSource`] is the raw upstream request. It can fail in all
//!   the ways a network call can, and is only ever called by the cache.

mod opensky;
mod synthetic;

pub use opensky::{OpenSkySource, OPENSKY_STATES_URL};
pub use synthetic::SyntheticFlightGenerator;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::flight::{BoundingBox, Coordinate, FlightBatch};
use crate::protocol::ParseError;

/// Errors from an upstream state-vector request.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("upstream quota exhausted (HTTP 429)")]
    RateLimited,

    #[error("upstream returned HTTP {0}")]
    Status(u16),

    #[error("upstream request timed out")]
    Timeout,

    #[error("upstream request cancelled")]
    Cancelled,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed payload: {0}")]
    Parse(#[from] ParseError),

    #[error("upstream payload contained no flights")]
    Empty,
}

/// A source of flights around a center point.
#[async_trait]
pub trait FlightSource: Send + Sync {
    /// Return the current flights around `center`. Never fails.
    async fn fetch_flights(&self, center: Coordinate) -> FlightBatch;

    /// Abort any in-flight request. Sources without network I/O ignore this.
    fn shutdown(&self) {}
}

/// The raw upstream telemetry request.
#[async_trait]
pub trait StateVectorSource: Send + Sync {
    /// Fetch the raw response body for `bbox`.
    ///
    /// Implementations must stop and return [`FetchError::Cancelled`] once
    /// `cancel` fires.
    async fn fetch_states(
        &self,
        bbox: BoundingBox,
        cancel: CancellationToken,
    ) -> Result<Vec<u8>, FetchError>;
}
