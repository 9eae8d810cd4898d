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

use crate::config::Location;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::error;
use std::fmt;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub const HOURLY_PRECIPITATION_PROBABILITY: &str = "precipitation_probability";
pub const DAILY_TEMPERATURE_MAX: &str = "temperature_2m_max";
pub const DAILY_TEMPERATURE_MIN: &str = "temperature_2m_min";
pub const FORECAST_TIMEZONE: &str = "GMT";
pub const FORECAST_DAYS: u32 = 1;
pub const HOURS_PER_DAY: usize = 24;

#[derive(Debug)]
pub enum FetchError {
    Internal(reqwest::Error),
    Api(StatusCode, String),
    Unexpected(StatusCode, Url),
    Malformed(String),
    LocationCount { expected: usize, actual: usize },
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(e) => write!(f, "{}", e),
            Self::Api(status, reason) => write!(f, "forecast API error {}: {}", status, reason),
            Self::Unexpected(status, url) => write!(f, "unexpected status {} for {}", status, url),
            Self::Malformed(reason) => write!(f, "malformed forecast payload: {}", reason),
            Self::LocationCount { expected, actual } => {
                write!(f, "expected forecasts for {} locations, got {}", expected, actual)
            }
        }
    }
}

impl error::Error for FetchError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Internal(e) => Some(e),
            _ => None,
        }
    }
}

/// The fixed set of coordinates and variables sent to the forecast API.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRequest {
    coordinates: Vec<(f64, f64)>,
}

impl ForecastRequest {
    pub fn new(locations: &[Location]) -> Self {
        ForecastRequest {
            coordinates: locations.iter().map(|l| (l.latitude, l.longitude)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let join = |f: fn(&(f64, f64)) -> f64| {
            self.coordinates
                .iter()
                .map(|c| f(c).to_string())
                .collect::<Vec<_>>()
                .join(",")
        };

        vec![
            ("latitude", join(|c| c.0)),
            ("longitude", join(|c| c.1)),
            ("hourly", HOURLY_PRECIPITATION_PROBABILITY.to_owned()),
            ("daily", format!("{},{}", DAILY_TEMPERATURE_MAX, DAILY_TEMPERATURE_MIN)),
            ("timezone", FORECAST_TIMEZONE.to_owned()),
            ("forecast_days", FORECAST_DAYS.to_string()),
        ]
    }
}

/// Forecast for a single location and a single day.
///
/// `precipitation_probability` holds one entry per hour, index 0 being midnight
/// in the response timezone. Hours the provider has no value for are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastResponse {
    pub latitude: f64,
    pub longitude: f64,
    pub precipitation_probability: Vec<Option<f64>>,
    pub temperature_max: f64,
    pub temperature_min: f64,
}

impl ForecastResponse {
    fn from_raw(raw: RawForecast) -> Result<Self, FetchError> {
        let hourly = raw.hourly.precipitation_probability;
        if hourly.len() != HOURS_PER_DAY {
            return Err(FetchError::Malformed(format!(
                "expected {} hourly values, got {}",
                HOURS_PER_DAY,
                hourly.len()
            )));
        }

        let first = |series: &[Option<f64>], name: &str| {
            series
                .first()
                .copied()
                .flatten()
                .ok_or_else(|| FetchError::Malformed(format!("missing daily {}", name)))
        };

        Ok(ForecastResponse {
            latitude: raw.latitude,
            longitude: raw.longitude,
            precipitation_probability: hourly,
            temperature_max: first(&raw.daily.temperature_2m_max, DAILY_TEMPERATURE_MAX)?,
            temperature_min: first(&raw.daily.temperature_2m_min, DAILY_TEMPERATURE_MIN)?,
        })
    }
}

#[derive(Deserialize, Debug)]
struct RawForecast {
    latitude: f64,
    longitude: f64,
    hourly: RawHourly,
    daily: RawDaily,
}

#[derive(Deserialize, Debug)]
struct RawHourly {
    #[serde(default)]
    precipitation_probability: Vec<Option<f64>>,
}

#[derive(Deserialize, Debug)]
struct RawDaily {
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
}

// Several coordinates come back as an array, a single one as a bare object.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum RawBody {
    Many(Vec<RawForecast>),
    One(RawForecast),
}

#[derive(Deserialize, Debug)]
struct RawApiError {
    reason: String,
}

/// Parse a successful forecast body into one response per requested location.
pub fn parse_forecasts(body: &str, expected: usize) -> Result<Vec<ForecastResponse>, FetchError> {
    let raw = match serde_json::from_str::<RawBody>(body) {
        Ok(RawBody::Many(v)) => v,
        Ok(RawBody::One(f)) => vec![f],
        Err(e) => return Err(FetchError::Malformed(e.to_string())),
    };

    if raw.len() != expected {
        return Err(FetchError::LocationCount {
            expected,
            actual: raw.len(),
        });
    }

    raw.into_iter().map(ForecastResponse::from_raw).collect()
}

/// Bounded retry with exponential backoff for transient failures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub backoff_factor: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt`, starting at 1.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_factor * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    fn is_retryable(status: StatusCode) -> bool {
        matches!(
            status,
            StatusCode::TOO_MANY_REQUESTS
                | StatusCode::INTERNAL_SERVER_ERROR
                | StatusCode::BAD_GATEWAY
                | StatusCode::SERVICE_UNAVAILABLE
                | StatusCode::GATEWAY_TIMEOUT
        )
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            retries: 5,
            backoff_factor: Duration::from_millis(200),
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    url: Url,
    stored: Instant,
    forecasts: Vec<ForecastResponse>,
}

/// Client for the Open-Meteo forecast API.
#[derive(Debug)]
pub struct OpenMeteoClient {
    client: Client,
    base_url: Url,
    retry: RetryPolicy,
    cache_ttl: Duration,
    cache: Mutex<Option<CacheEntry>>,
}

impl OpenMeteoClient {
    const USER_AGENT: &'static str = concat!("weather_digest/", env!("CARGO_PKG_VERSION"));
    const JSON_RESPONSE: &'static str = "application/json";

    pub fn new(client: Client, base_url: Url, retry: RetryPolicy, cache_ttl: Duration) -> Self {
        OpenMeteoClient {
            client,
            base_url,
            retry,
            cache_ttl,
            cache: Mutex::new(None),
        }
    }

    pub async fn forecast(&self, request: &ForecastRequest) -> Result<Vec<ForecastResponse>, FetchError> {
        let url = self.forecast_url(request);

        if let Some(cached) = self.cached(&url).await {
            tracing::debug!(message = "using cached forecast", url = %url);
            return Ok(cached);
        }

        tracing::debug!(message = "making forecast request", url = %url);
        let body = self.make_request(&url).await?;
        let forecasts = parse_forecasts(&body, request.len())?;

        *self.cache.lock().await = Some(CacheEntry {
            url,
            stored: Instant::now(),
            forecasts: forecasts.clone(),
        });

        Ok(forecasts)
    }

    async fn cached(&self, url: &Url) -> Option<Vec<ForecastResponse>> {
        let cache = self.cache.lock().await;
        cache
            .as_ref()
            .filter(|e| &e.url == url && e.stored.elapsed() < self.cache_ttl)
            .map(|e| e.forecasts.clone())
    }

    async fn make_request(&self, url: &Url) -> Result<String, FetchError> {
        let mut attempt = 0;

        loop {
            let result = self
                .client
                .get(url.clone())
                .header(USER_AGENT, Self::USER_AGENT)
                .header(ACCEPT, Self::JSON_RESPONSE)
                .send()
                .await;

            let retryable = match result {
                Ok(res) if res.status().is_success() => {
                    return res.text().await.map_err(FetchError::Internal);
                }
                Ok(res) if RetryPolicy::is_retryable(res.status()) => {
                    FetchError::Unexpected(res.status(), url.clone())
                }
                Ok(res) => return Err(Self::error_from_response(res, url).await),
                Err(e) if e.is_builder() => return Err(FetchError::Internal(e)),
                Err(e) => FetchError::Internal(e),
            };

            attempt += 1;
            if attempt > self.retry.retries {
                return Err(retryable);
            }

            let delay = self.retry.backoff(attempt);
            tracing::warn!(
                message = "retrying forecast request",
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                error = %retryable,
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn error_from_response(res: reqwest::Response, url: &Url) -> FetchError {
        let status = res.status();
        match res.json::<RawApiError>().await {
            Ok(e) => FetchError::Api(status, e.reason),
            Err(_) => FetchError::Unexpected(status, url.clone()),
        }
    }

    fn forecast_url(&self, request: &ForecastRequest) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut p) = url.path_segments_mut() {
            p.pop_if_empty().push("v1").push("forecast");
        }

        url.query_pairs_mut().extend_pairs(request.query_pairs());
        url
    }
}

/// Anything that can produce today's forecasts for the configured locations.
#[async_trait]
pub trait ForecastSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<ForecastResponse>, FetchError>;
}

/// Pairs a client with the request built once at startup.
#[derive(Debug)]
pub struct WeatherFetcher {
    client: OpenMeteoClient,
    request: ForecastRequest,
}

impl WeatherFetcher {
    pub fn new(client: OpenMeteoClient, request: ForecastRequest) -> Self {
        WeatherFetcher { client, request }
    }
}

#[async_trait]
impl ForecastSource for WeatherFetcher {
    async fn fetch(&self) -> Result<Vec<ForecastResponse>, FetchError> {
        self.client.forecast(&self.request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(values: &str) -> String {
        format!(
            r#"{{"latitude":35.7,"longitude":139.7,"timezone":"GMT",
                "hourly":{{"time":[],"precipitation_probability":[{}]}},
                "daily":{{"time":["2026-10-19"],"temperature_2m_max":[21.34],"temperature_2m_min":[14.0]}}}}"#,
            values
        )
    }

    fn zeros() -> String {
        vec!["0"; 24].join(",")
    }

    #[test]
    fn parse_single_object() {
        let forecasts = parse_forecasts(&day(&zeros()), 1).unwrap();
        assert_eq!(forecasts.len(), 1);
        assert_eq!(forecasts[0].temperature_max, 21.34);
        assert_eq!(forecasts[0].temperature_min, 14.0);
        assert_eq!(forecasts[0].precipitation_probability.len(), 24);
    }

    #[test]
    fn parse_array_keeps_order() {
        let second = day(&zeros()).replace("\"latitude\":35.7", "\"latitude\":34.7");
        let body = format!("[{},{}]", day(&zeros()), second);

        let forecasts = parse_forecasts(&body, 2).unwrap();
        assert_eq!(forecasts[0].latitude, 35.7);
        assert_eq!(forecasts[1].latitude, 34.7);
    }

    #[test]
    fn parse_keeps_missing_hours_as_none() {
        let mut values = vec!["0"; 24];
        values[5] = "null";
        let forecasts = parse_forecasts(&day(&values.join(",")), 1).unwrap();
        assert_eq!(forecasts[0].precipitation_probability[5], None);
        assert_eq!(forecasts[0].precipitation_probability[6], Some(0.0));
    }

    #[test]
    fn parse_rejects_wrong_hour_count() {
        let err = parse_forecasts(&day("0,0,0"), 1).unwrap_err();
        assert!(matches!(err, FetchError::Malformed(_)));
    }

    #[test]
    fn parse_rejects_wrong_location_count() {
        let err = parse_forecasts(&day(&zeros()), 2).unwrap_err();
        assert!(matches!(err, FetchError::LocationCount { expected: 2, actual: 1 }));
    }

    #[test]
    fn parse_rejects_missing_daily_value() {
        let body = day(&zeros()).replace("[21.34]", "[null]");
        let err = parse_forecasts(&body, 1).unwrap_err();
        assert!(err.to_string().contains(DAILY_TEMPERATURE_MAX));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(parse_forecasts("<html>", 1), Err(FetchError::Malformed(_))));
    }

    #[test]
    fn forecast_url_contains_all_parameters() {
        let locations = vec![
            Location::new("Tokyo", 35.68, 139.76).unwrap(),
            Location::new("Osaka", 34.69, 135.5).unwrap(),
        ];
        let client = OpenMeteoClient::new(
            Client::new(),
            Url::parse("https://api.open-meteo.com/").unwrap(),
            RetryPolicy::default(),
            Duration::from_secs(3600),
        );

        let url = client.forecast_url(&ForecastRequest::new(&locations));
        assert_eq!(url.path(), "/v1/forecast");

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let get = |k: &str| pairs.iter().find(|(name, _)| name == k).map(|(_, v)| v.clone());
        assert_eq!(get("latitude").as_deref(), Some("35.68,34.69"));
        assert_eq!(get("longitude").as_deref(), Some("139.76,135.5"));
        assert_eq!(get("hourly").as_deref(), Some("precipitation_probability"));
        assert_eq!(get("daily").as_deref(), Some("temperature_2m_max,temperature_2m_min"));
        assert_eq!(get("timezone").as_deref(), Some("GMT"));
        assert_eq!(get("forecast_days").as_deref(), Some("1"));
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(4), Duration::from_millis(1600));
    }
}
