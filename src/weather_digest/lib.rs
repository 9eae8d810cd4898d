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

//! Daily Open-Meteo forecast digests posted to a Discord channel
//!
//! ## Features
//!
//! `weather_digest` fetches today's forecast for one or more locations from the [Open-Meteo] API once a
//! day at a configured local time and posts a short summary to a single Discord channel. For each location
//! the summary contains:
//!
//! * The location name.
//! * The day's maximum and minimum temperature, rounded to one decimal place.
//! * The hours (in GMT) where the chance of rain is above 40%, if any.
//!
//! Before sleeping until the next run, the bot posts a message announcing when that run will happen. A
//! notice is also posted once at startup.
//!
//! [Open-Meteo]: https://open-meteo.com/en/docs
//!
//! ## Build
//!
//! `weather_digest` is a Rust program and must be built from source using a [Rust toolchain](https://rustup.rs/).
//!
//! ```text
//! cargo build --release
//! ```
//!
//! ## Usage
//!
//! ### Configuration
//!
//! Every option can be passed as a flag or an environment variable. A `.env` file in the working directory
//! is read at startup, so the bot can be configured like this:
//!
//! ```text
//! DISCORD_BOT_TOKEN=...
//! CHANNEL_ID=123456789012345678
//! FIRST_LOCATE=東京
//! FIRST_LOCATE_LATITUDE=35.6895
//! FIRST_LOCATE_LONGITUDE=139.6917
//! SECOND_LOCATE=大阪
//! SECOND_LOCATE_LATITUDE=34.6937
//! SECOND_LOCATE_LONGITUDE=135.5023
//! SEND_TIME=06:00:00
//! ```
//!
//! The second location is optional. Missing or invalid settings stop the bot before it contacts
//! Discord or Open-Meteo.
//!
//! ### Failures
//!
//! If the forecast can't be fetched, that day's digest is skipped and the error is logged. Pass
//! `--notify-on-failure` to also post a short notice to the channel. Either way the bot keeps running
//! and tries again the next day.
//!
//! ### Metrics
//!
//! With `--bind 127.0.0.1:9783`, counters about the bot itself (runs, digests sent, failures, next run
//! time) are exposed in Prometheus text format at `/metrics`.
//!

pub mod chat;
pub mod config;
pub mod digest;
pub mod forecast;
pub mod http;
pub mod metrics;
pub mod schedule;
