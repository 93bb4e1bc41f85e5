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

//! OpenSky Network REST client.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

use super::{FetchError, StateVectorSource};
use crate::flight::BoundingBox;

/// Anonymous `states/all` endpoint.
pub const OPENSKY_STATES_URL: &str = "https://opensky-network.org/api/states/all";

/// HTTP client for the OpenSky `states/all` endpoint.
pub struct OpenSkySource {
    client: reqwest::Client,
    url: String,
    credentials: Option<(String, String)>,
}

impl std::fmt::Debug for OpenSkySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenSkySource")
            .field("url", &self.url)
            .field("authenticated", &self.credentials.is_some())
            .finish_non_exhaustive()
    }
}

impl OpenSkySource {
    /// Create a client for `url`.
    ///
    /// `timeout` is a transport-level ceiling; the polling cache enforces its
    /// own, usually shorter, deadline through cancellation.
    pub fn new(
        url: impl Into<String>,
        timeout: Duration,
        credentials: Option<(String, String)>,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            credentials,
        })
    }

    fn request_url(&self, bbox: &BoundingBox) -> String {
        format!(
            "{}?lamin={}&lomin={}&lamax={}&lomax={}",
            self.url, bbox.lat_min, bbox.lon_min, bbox.lat_max, bbox.lon_max
        )
    }
}

#[async_trait]
impl StateVectorSource for OpenSkySource {
    async fn fetch_states(
        &self,
        bbox: BoundingBox,
        cancel: CancellationToken,
    ) -> Result<Vec<u8>, FetchError> {
        let url = self.request_url(&bbox);
        debug!("Requesting {}", url);

        let mut request = self.client.get(&url);
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, Some(password));
        }

        let exchange = async {
            let response = request.send().await.map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout
                } else {
                    FetchError::Transport(e.to_string())
                }
            })?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(FetchError::RateLimited);
            }
            if !status.is_success() {
                return Err(FetchError::Status(status.as_u16()));
            }

            let body = response
                .bytes()
                .await
                .map_err(|e| FetchError::Transport(e.to_string()))?;
            Ok(body.to_vec())
        };

        tokio::select! {
            result = exchange => result,
            () = cancel.cancelled() => Err(FetchError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flight::Coordinate;

    #[test]
    fn test_request_url_has_bbox_params() {
        let source = OpenSkySource::new(OPENSKY_STATES_URL, Duration::from_secs(5), None).unwrap();
        let bbox = BoundingBox::around(Coordinate::new(40.0, -80.0), 0.5);
        assert_eq!(
            source.request_url(&bbox),
            "https://opensky-network.org/api/states/all?lamin=39.5&lomin=-80.5&lamax=40.5&lomax=-79.5"
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_send() {
        // Unroutable address; the pre-cancelled token must win the race
        let source = OpenSkySource::new("http://10.255.255.1/states", Duration::from_secs(30), None).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let bbox = BoundingBox::around(Coordinate::new(0.0, 0.0), 0.35);
        let result = source.fetch_states(bbox, cancel).await;
        assert!(matches!(result, Err(FetchError::Cancelled) | Err(FetchError::Transport(_))));
    }
}
