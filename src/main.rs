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

mod config;
mod status;

use std::time::Duration;

use clap::Parser;
use config::AppConfig;
use flight_engine::{TrackerEvent, TrafficClient, ViewFilter};
use log::{debug, error, info};
use status::TrafficSummary;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser, Debug)]
#[command(name = "skyport-traffic", about = "Live flight traffic around an airport")]
struct Cli {
    /// Center latitude (overrides config)
    #[arg(long, allow_hyphen_values = true)]
    lat: Option<f64>,

    /// Center longitude (overrides config)
    #[arg(long, allow_hyphen_values = true)]
    lon: Option<f64>,

    /// View filter: all, air, ground, or a phase name
    #[arg(short, long)]
    filter: Option<ViewFilter>,

    /// Use synthetic traffic only, never contact the network
    #[arg(short, long)]
    simulate: bool,

    /// Stop after this many seconds
    #[arg(short, long)]
    duration: Option<u64>,

    /// Print details for the flight matching this callsign or id
    #[arg(short, long)]
    track: Option<String>,

    /// Print the config file path and exit
    #[arg(long)]
    print_config_path: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    if cli.print_config_path {
        println!("{}", AppConfig::get_config_path()?.display());
        return Ok(());
    }

    let mut app_config = AppConfig::load()?;
    if let Some(lat) = cli.lat {
        app_config.center_latitude = lat;
    }
    if let Some(lon) = cli.lon {
        app_config.center_longitude = lon;
    }

    let mut client_config = app_config.client_config(cli.simulate);
    if let Some(filter) = cli.filter {
        client_config.filter = filter;
    }

    info!(
        "Tracking traffic around {} ({})",
        client_config.center,
        if cli.simulate { "simulation" } else { "live" }
    );

    let client = TrafficClient::spawn(client_config)?;
    let mut events = client.subscribe();

    let mut report = tokio::time::interval(Duration::from_secs(app_config.poll_interval_secs.max(1)));
    let deadline = async {
        match cli.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = report.tick() => {
                print!("{}", TrafficSummary::capture(&client));
                if let Some(query) = cli.track.as_deref() {
                    match client.find(query) {
                        Some(tracked) => println!("{}", status::track_line(&tracked)),
                        None => println!("  no flight matches {query:?}"),
                    }
                }
            }
            event = events.recv() => match event {
                Ok(TrackerEvent::FlightAdded(id)) => debug!("+ {}", id),
                Ok(TrackerEvent::FlightRemoved(id)) => debug!("- {}", id),
                Ok(TrackerEvent::FlightUpdated(_)) => {}
                Err(RecvError::Lagged(n)) => debug!("Skipped {} tracker events", n),
                Err(RecvError::Closed) => {
                    error!("Tracker event channel closed");
                    break;
                }
            },
            () = &mut deadline => {
                info!("Run duration elapsed");
                break;
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Failed to listen for ctrl-c: {}", e);
                }
                info!("Shutting down");
                break;
            }
        }
    }

    client.shutdown();
    Ok(())
}
