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
use std::error;
use std::fmt;
use std::io;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    EmptyName,
    InvalidLatitude(f64),
    InvalidLongitude(f64),
    IncompleteLocation(String),
    InvalidSendTime(String),
    NoLocations,
    EnvFile(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyName => write!(f, "location name must not be empty"),
            Self::InvalidLatitude(v) => write!(f, "latitude {} is outside of -90..=90", v),
            Self::InvalidLongitude(v) => write!(f, "longitude {} is outside of -180..=180", v),
            Self::IncompleteLocation(s) => write!(f, "location {} needs a name, latitude, and longitude", s),
            Self::InvalidSendTime(s) => write!(f, "invalid send time {}, expected HH:MM or HH:MM:SS", s),
            Self::NoLocations => write!(f, "at least one location must be configured"),
            Self::EnvFile(s) => write!(f, "unable to load .env file: {}", s),
        }
    }
}

impl error::Error for ConfigError {}

/// A named point that forecasts are requested for.
///
/// Locations are kept in configuration order and the digest is rendered in the
/// same order, so the first configured location is always the first section.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new<S: Into<String>>(name: S, latitude: f64, longitude: f64) -> Result<Self, ConfigError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }

        if !(-90.0..=90.0).contains(&latitude) {
            return Err(ConfigError::InvalidLatitude(latitude));
        }

        if !(-180.0..=180.0).contains(&longitude) {
            return Err(ConfigError::InvalidLongitude(longitude));
        }

        Ok(Location {
            name,
            latitude,
            longitude,
        })
    }

    /// Build a location from values that may each be absent. All three absent means
    /// "not configured" and yields `Ok(None)`, any other mix of present and missing
    /// values is an error.
    pub fn from_parts(
        label: &str,
        name: Option<String>,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Result<Option<Self>, ConfigError> {
        match (name, latitude, longitude) {
            (None, None, None) => Ok(None),
            (Some(n), Some(lat), Some(lon)) => Location::new(n, lat, lon).map(Some),
            _ => Err(ConfigError::IncompleteLocation(label.to_owned())),
        }
    }
}

/// Collect configured locations, preserving order and rejecting an empty list.
pub fn locations<I>(configured: I) -> Result<Vec<Location>, ConfigError>
where
    I: IntoIterator<Item = Option<Location>>,
{
    let out: Vec<Location> = configured.into_iter().flatten().collect();
    if out.is_empty() {
        Err(ConfigError::NoLocations)
    } else {
        Ok(out)
    }
}

/// Parse the daily send time, accepting `HH:MM:SS` or `HH:MM`.
pub fn parse_send_time(s: &str) -> Result<NaiveTime, ConfigError> {
    let trimmed = s.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
        .map_err(|_| ConfigError::InvalidSendTime(s.to_owned()))
}

/// Load `.env` from the working directory or its parents into the environment.
///
/// `Ok(false)` when there is no such file. A file that exists but can't be read or
/// parsed is an error.
pub fn load_dotenv() -> Result<bool, ConfigError> {
    env_file_result(dotenvy::dotenv().map(|_| ()))
}

/// Like `load_dotenv` for a file at a specific path.
pub fn load_env_file(path: &Path) -> Result<bool, ConfigError> {
    env_file_result(dotenvy::from_path(path))
}

fn env_file_result(res: Result<(), dotenvy::Error>) -> Result<bool, ConfigError> {
    match res {
        Ok(()) => Ok(true),
        Err(dotenvy::Error::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(ConfigError::EnvFile(e.to_string())),
    }
}
