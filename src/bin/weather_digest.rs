// weather_digest - Daily Open-Meteo forecast digests for Discord
//
// Copyright 2026 The weather_digest authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use chrono::NaiveTime;
use clap::Parser;
use prometheus_client::registry::Registry;
use reqwest::{Client, Url};
use std::error::Error;
use std::io;
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{self, SignalKind};
use tokio::sync::watch;
use tracing::Level;
use weather_digest::chat::{ChatError, DiscordClient};
use weather_digest::config::{self, Location};
use weather_digest::forecast::{ForecastRequest, OpenMeteoClient, RetryPolicy, WeatherFetcher};
use weather_digest::http::RequestContext;
use weather_digest::metrics::DigestMetrics;
use weather_digest::schedule::{DigestJob, FailurePolicy, Scheduler, SystemClock};

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_SEND_AT: &str = "06:00:00";
const DEFAULT_REST_SECS: u64 = 24 * 60 * 60;
const DEFAULT_TIMEOUT_MILLIS: u64 = 10000;
const DEFAULT_CACHE_SECS: u64 = 3600;
const DEFAULT_FORECAST_URL: &str = "https://api.open-meteo.com/";
const DEFAULT_DISCORD_URL: &str = "https://discord.com/api/v10/";

#[derive(Debug, Parser)]
#[clap(name = "weather_digest", version = clap::crate_version!())]
struct WeatherDigestApplication {
    /// Discord bot token used to post messages
    #[clap(long, env = "DISCORD_BOT_TOKEN", hide_env_values = true)]
    token: String,

    /// ID of the Discord channel digests are posted to
    #[clap(long, env = "CHANNEL_ID")]
    channel_id: u64,

    /// Display name of the first location
    #[clap(long, env = "FIRST_LOCATE")]
    first_location: String,

    /// Latitude of the first location
    #[clap(long, env = "FIRST_LOCATE_LATITUDE", allow_negative_numbers = true)]
    first_latitude: f64,

    /// Longitude of the first location
    #[clap(long, env = "FIRST_LOCATE_LONGITUDE", allow_negative_numbers = true)]
    first_longitude: f64,

    /// Display name of the optional second location
    #[clap(long, env = "SECOND_LOCATE")]
    second_location: Option<String>,

    /// Latitude of the optional second location
    #[clap(long, env = "SECOND_LOCATE_LATITUDE", allow_negative_numbers = true)]
    second_latitude: Option<f64>,

    /// Longitude of the optional second location
    #[clap(long, env = "SECOND_LOCATE_LONGITUDE", allow_negative_numbers = true)]
    second_longitude: Option<f64>,

    /// Local time of day to post the digest, as HH:MM:SS or HH:MM
    #[clap(long, env = "SEND_TIME", default_value = DEFAULT_SEND_AT, value_parser = config::parse_send_time)]
    send_at: NaiveTime,

    /// Pause after each run before scheduling the next one, in seconds
    #[clap(long, env = "REST_SECS", default_value_t = DEFAULT_REST_SECS)]
    rest_secs: u64,

    /// Post a notice to the channel when the forecast can't be fetched
    #[clap(long, env = "NOTIFY_ON_FAILURE")]
    notify_on_failure: bool,

    /// Base URL for the Open-Meteo API
    #[clap(long, env = "FORECAST_API_URL", default_value_t = DEFAULT_FORECAST_URL.into())]
    forecast_url: String,

    /// Base URL for the Discord API
    #[clap(long, env = "DISCORD_API_URL", default_value_t = DEFAULT_DISCORD_URL.into())]
    discord_url: String,

    /// Timeout for requests to Open-Meteo and Discord, in milliseconds
    #[clap(long, default_value_t = DEFAULT_TIMEOUT_MILLIS)]
    timeout_millis: u64,

    /// Reuse an identical forecast response for this long, in seconds
    #[clap(long, default_value_t = DEFAULT_CACHE_SECS)]
    cache_secs: u64,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, env = "LOG_LEVEL", default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Address to expose metrics about the bot on. Metrics are not served unless this is set
    #[clap(long, env = "METRICS_BIND")]
    bind: Option<SocketAddr>,
}

impl WeatherDigestApplication {
    fn locations(&self) -> Result<Vec<Location>, config::ConfigError> {
        let first = Location::new(self.first_location.clone(), self.first_latitude, self.first_longitude)?;
        let second = Location::from_parts(
            "second",
            self.second_location.clone(),
            self.second_latitude,
            self.second_longitude,
        )?;

        config::locations([Some(first), second])
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    // Loaded before parsing so its values count as environment variables.
    let env_file = config::load_dotenv();

    let opts = WeatherDigestApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    if let Err(e) = env_file {
        tracing::error!(message = "invalid .env file", error = %e);
        process::exit(1);
    }

    let locations = opts.locations().unwrap_or_else(|e| {
        tracing::error!(message = "invalid location configuration", error = %e);
        process::exit(1)
    });

    let forecast_url = parse_url(&opts.forecast_url, "forecast_url");
    let discord_url = parse_url(&opts.discord_url, "discord_url");

    let timeout = Duration::from_millis(opts.timeout_millis);
    let http_client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize HTTP client", error = %e);
        process::exit(1)
    });

    // Log in before scheduling anything. A rejected token or unknown channel won't fix
    // itself, so exit. Other failures may be transient and the loop will keep trying.
    let discord = DiscordClient::new(http_client.clone(), discord_url, opts.token.clone(), opts.channel_id);
    match discord.current_user().await {
        Err(ChatError::InvalidToken) => {
            tracing::error!(message = "bot token was rejected by Discord");
            process::exit(1)
        }
        Err(e) => {
            tracing::warn!(message = "failed to verify bot login", error = %e);
        }
        Ok(u) => {
            tracing::info!(message = "logged in", user = %u.username, id = %u.id);
        }
    }

    match discord.channel().await {
        Err(e @ ChatError::InvalidChannel(_)) | Err(e @ ChatError::InvalidToken) => {
            tracing::error!(message = "output channel is not usable", channel = opts.channel_id, error = %e);
            process::exit(1)
        }
        Err(e) => {
            tracing::warn!(message = "failed to look up output channel", channel = opts.channel_id, error = %e);
        }
        Ok(c) => {
            tracing::debug!(message = "verified output channel", channel = ?c);
        }
    }

    let mut registry = Registry::default();
    let metrics = DigestMetrics::new(&mut registry);
    let (shutdown_tx, shutdown_rx) = watch::channel(());

    tokio::spawn(async move {
        // Wait for either SIGTERM or SIGINT to shutdown
        tokio::select! {
            _ = sigterm() => {}
            _ = sigint() => {}
        }

        tracing::info!("shutdown signal received");
        shutdown_tx.send(()).ok();
    });

    let server = opts.bind.map(|addr| {
        let context = Arc::new(RequestContext::new(registry));
        let app = weather_digest::http::app(context);
        let mut shutdown = shutdown_rx.clone();

        let server = axum::Server::try_bind(&addr).unwrap_or_else(|e| {
            tracing::error!(message = "error binding to address", address = %addr, error = %e);
            process::exit(1)
        });

        tracing::info!(message = "metrics server started", address = %addr);
        tokio::spawn(
            server
                .serve(app.into_make_service())
                .with_graceful_shutdown(async move {
                    shutdown.changed().await.ok();
                }),
        )
    });

    let policy = if opts.notify_on_failure {
        FailurePolicy::Notify
    } else {
        FailurePolicy::LogOnly
    };

    let request = ForecastRequest::new(&locations);
    let forecast = OpenMeteoClient::new(
        http_client,
        forecast_url,
        RetryPolicy::default(),
        Duration::from_secs(opts.cache_secs),
    );
    let job = DigestJob::new(
        WeatherFetcher::new(forecast, request),
        discord,
        locations,
        policy,
        metrics.clone(),
    );
    let scheduler = Scheduler::new(
        SystemClock,
        opts.send_at,
        Duration::from_secs(opts.rest_secs),
        job,
        metrics,
    );

    tracing::info!(
        message = "digest scheduling started",
        send_at = %opts.send_at,
        channel = opts.channel_id,
        api_url = %opts.forecast_url,
    );
    scheduler.run(shutdown_rx).await;

    if let Some(handle) = server {
        if let Err(e) = handle.await? {
            tracing::error!(message = "metrics server failed", error = %e);
        }
    }

    tracing::info!("shutdown");
    Ok(())
}

fn parse_url(raw: &str, flag: &str) -> Url {
    Url::parse(raw).unwrap_or_else(|e| {
        tracing::error!(message = "invalid URL", flag = flag, url = raw, error = %e);
        process::exit(1)
    })
}

/// Return after the first SIGTERM signal received by this process
async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
async fn sigint() -> io::Result<()> {
    unix::signal(SignalKind::interrupt())?.recv().await;
    Ok(())
}
