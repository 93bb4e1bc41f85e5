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

//! Application configuration management.
//!
//! Configuration is stored as TOML via `confy`. Every field has a serde
//! default so older or hand-edited files load without migration.

use std::time::Duration;

use flight_engine::{
    CacheConfig, ClientConfig, Coordinate, PhaseThresholds, PollerConfig, SourceMode,
    TrackerConfig, ViewFilter, OPENSKY_STATES_URL,
};
use log::warn;
use serde::{Deserialize, Serialize};

const APP_NAME: &str = "skyport-traffic";
const CONFIG_NAME: &str = "config";

/// Application configuration stored in TOML format
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    /// Polling center latitude (default: ORD)
    #[serde(default = "default_center_latitude")]
    pub center_latitude: f64,

    /// Polling center longitude (default: ORD)
    #[serde(default = "default_center_longitude")]
    pub center_longitude: f64,

    /// Seconds between flight polls
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Milliseconds between animation frames
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,

    /// Upstream state-vector endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// OpenSky username (optional, env var takes precedence)
    #[serde(default)]
    pub opensky_username: Option<String>,

    /// OpenSky password (optional, env var takes precedence)
    #[serde(default)]
    pub opensky_password: Option<String>,

    /// Seconds a successful fetch is reused
    #[serde(default = "default_cache_window_secs")]
    pub cache_window_secs: u64,

    /// Seconds to stay offline after a rate-limit response
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,

    /// Hard deadline for one upstream request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Maximum flights kept from one response
    #[serde(default = "default_max_flights")]
    pub max_flights: usize,

    /// Half-width of the query box in degrees
    #[serde(default = "default_bbox_half_span_deg")]
    pub bbox_half_span_deg: f64,

    /// Trail samples kept per flight
    #[serde(default = "default_history_len")]
    pub history_len: usize,

    /// Flight phase classification thresholds
    #[serde(default)]
    pub phase_thresholds: PhaseThresholds,

    /// View filter: "all", "air", "ground", or a phase name
    #[serde(default = "default_view_filter")]
    pub view_filter: String,
}

// Default value functions for serde
fn default_center_latitude() -> f64 {
    41.9742
}

fn default_center_longitude() -> f64 {
    -87.9073
}

fn default_poll_interval_secs() -> u64 {
    8
}

fn default_frame_interval_ms() -> u64 {
    16
}

fn default_api_url() -> String {
    OPENSKY_STATES_URL.to_string()
}

fn default_cache_window_secs() -> u64 {
    15
}

fn default_backoff_secs() -> u64 {
    60
}

fn default_request_timeout_secs() -> u64 {
    5
}

fn default_max_flights() -> usize {
    50
}

fn default_bbox_half_span_deg() -> f64 {
    0.35
}

fn default_history_len() -> usize {
    30
}

fn default_view_filter() -> String {
    "all".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            center_latitude: default_center_latitude(),
            center_longitude: default_center_longitude(),
            poll_interval_secs: default_poll_interval_secs(),
            frame_interval_ms: default_frame_interval_ms(),
            api_url: default_api_url(),
            opensky_username: None,
            opensky_password: None,
            cache_window_secs: default_cache_window_secs(),
            backoff_secs: default_backoff_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            max_flights: default_max_flights(),
            bbox_half_span_deg: default_bbox_half_span_deg(),
            history_len: default_history_len(),
            phase_thresholds: PhaseThresholds::default(),
            view_filter: default_view_filter(),
        }
    }
}

impl AppConfig {
    /// Load configuration from disk, creating it with defaults if missing
    pub fn load() -> Result<Self, confy::ConfyError> {
        confy::load(APP_NAME, CONFIG_NAME)
    }

    /// Get the config file path for display to user
    pub fn get_config_path() -> Result<std::path::PathBuf, confy::ConfyError> {
        confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)
    }

    /// Resolve OpenSky credentials from environment variables or config
    pub fn resolve_credentials(&self) -> Option<(String, String)> {
        let from_env = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        let username = from_env("OPENSKY_USERNAME")
            .or_else(|| self.opensky_username.clone().filter(|s| !s.is_empty()))?;
        let password = from_env("OPENSKY_PASSWORD")
            .or_else(|| self.opensky_password.clone().filter(|s| !s.is_empty()))?;

        Some((username, password))
    }

    /// Parsed view filter, falling back to "all" for unknown values
    pub fn view_filter(&self) -> ViewFilter {
        self.view_filter.parse().unwrap_or_else(|e| {
            warn!("{}, showing all flights", e);
            ViewFilter::All
        })
    }

    /// Build the engine configuration
    pub fn client_config(&self, simulate: bool) -> ClientConfig {
        let source = if simulate {
            SourceMode::Synthetic
        } else {
            SourceMode::Live {
                url: self.api_url.clone(),
                credentials: self.resolve_credentials(),
            }
        };

        ClientConfig {
            center: Coordinate::new(self.center_latitude, self.center_longitude),
            source,
            cache: CacheConfig {
                cache_window: Duration::from_secs(self.cache_window_secs),
                backoff_window: Duration::from_secs(self.backoff_secs),
                request_timeout: Duration::from_secs(self.request_timeout_secs),
                max_flights: self.max_flights,
                bbox_half_span: self.bbox_half_span_deg,
            },
            thresholds: self.phase_thresholds,
            tracker: TrackerConfig {
                history_len: self.history_len,
                ..Default::default()
            },
            poller: PollerConfig {
                poll_interval: Duration::from_secs(self.poll_interval_secs.max(1)),
                frame_interval: Duration::from_millis(self.frame_interval_ms.max(1)),
            },
            filter: self.view_filter(),
        }
    }
}
