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
use crate::forecast::{ForecastResponse, HOURS_PER_DAY};
use std::fmt;

/// Hours with a precipitation probability strictly above this are reported.
pub const RAIN_THRESHOLD: f64 = 40.0;

const MAX_TEMPERATURE_LABEL: &str = "最高気温";
const MIN_TEMPERATURE_LABEL: &str = "最低気温";
const RAIN_HOURS_LABEL: &str = "雨が降りそうな時間帯";

/// Labels (`"9:00"`, `"13:00"`) of the hours whose probability exceeds the threshold.
///
/// Only the first day's worth of values is considered. Missing values never count.
pub fn rain_hours(probabilities: &[Option<f64>]) -> Vec<String> {
    probabilities
        .iter()
        .take(HOURS_PER_DAY)
        .enumerate()
        .filter(|(_, p)| matches!(p, Some(v) if *v > RAIN_THRESHOLD))
        .map(|(hour, _)| format!("{}:00", hour))
        .collect()
}

/// Round to one decimal place, halves away from zero.
pub fn round_tenth(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Summary of one location's forecast, ready to be rendered as a message section.
#[derive(Debug, Clone, PartialEq)]
pub struct Digest {
    pub label: String,
    pub max_temperature: f64,
    pub min_temperature: f64,
    pub rain_hours: Vec<String>,
}

impl Digest {
    pub fn new(location: &Location, response: &ForecastResponse) -> Self {
        Digest {
            label: location.name.clone(),
            max_temperature: round_tenth(response.temperature_max),
            min_temperature: round_tenth(response.temperature_min),
            rain_hours: rain_hours(&response.precipitation_probability),
        }
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.label)?;
        writeln!(f, "{} : {:.1}度", MAX_TEMPERATURE_LABEL, self.max_temperature)?;
        writeln!(f, "{} : {:.1}度", MIN_TEMPERATURE_LABEL, self.min_temperature)?;

        if !self.rain_hours.is_empty() {
            write!(f, "{} : ", RAIN_HOURS_LABEL)?;
            for hour in &self.rain_hours {
                write!(f, "{} ", hour)?;
            }
            writeln!(f)?;
        }

        Ok(())
    }
}

/// Render the full message: one section per location in order, separated by a
/// blank line, with nothing after the last section.
///
/// Responses and locations are paired by position. The caller is expected to pass
/// one response per location; any surplus on either side is ignored.
pub fn build(responses: &[ForecastResponse], locations: &[Location]) -> String {
    locations
        .iter()
        .zip(responses)
        .map(|(location, response)| Digest::new(location, response).to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(max: f64, min: f64, rain: &[(usize, f64)]) -> ForecastResponse {
        let mut precipitation_probability = vec![Some(0.0); HOURS_PER_DAY];
        for (hour, p) in rain {
            precipitation_probability[*hour] = Some(*p);
        }

        ForecastResponse {
            latitude: 35.68,
            longitude: 139.76,
            precipitation_probability,
            temperature_max: max,
            temperature_min: min,
        }
    }

    fn tokyo() -> Location {
        Location::new("東京", 35.68, 139.76).unwrap()
    }

    fn osaka() -> Location {
        Location::new("大阪", 34.69, 135.5).unwrap()
    }

    #[test]
    fn rain_hours_strictly_above_threshold() {
        let mut values = vec![Some(0.0); 24];
        values[0] = Some(41.0);
        values[9] = Some(40.0);
        values[10] = Some(40.1);
        values[13] = Some(100.0);
        values[23] = None;

        assert_eq!(rain_hours(&values), vec!["0:00", "10:00", "13:00"]);
    }

    #[test]
    fn rain_hours_ignores_values_past_one_day() {
        let values = vec![Some(90.0); 30];
        assert_eq!(rain_hours(&values).len(), 24);
        assert_eq!(rain_hours(&values).last().map(String::as_str), Some("23:00"));
    }

    #[test]
    fn temperatures_rounded_to_one_decimal() {
        let text = Digest::new(&tokyo(), &response(21.34, 14.0, &[])).to_string();
        assert!(text.contains("最高気温 : 21.3度\n"));
        assert!(text.contains("最低気温 : 14.0度\n"));

        assert_eq!(round_tenth(-3.26), -3.3);
        assert_eq!(round_tenth(18.96), 19.0);
    }

    #[test]
    fn section_without_rain() {
        let text = Digest::new(&tokyo(), &response(21.34, 14.0, &[])).to_string();
        assert_eq!(text, "東京\n最高気温 : 21.3度\n最低気温 : 14.0度\n");
    }

    #[test]
    fn section_with_rain_has_trailing_space() {
        let text = Digest::new(&tokyo(), &response(21.34, 14.0, &[(9, 60.0), (15, 80.0)])).to_string();
        assert_eq!(
            text,
            "東京\n最高気温 : 21.3度\n最低気温 : 14.0度\n雨が降りそうな時間帯 : 9:00 15:00 \n"
        );
    }

    #[test]
    fn two_locations_one_separator_after_first() {
        let message = build(
            &[response(21.34, 14.0, &[(9, 60.0)]), response(25.0, 18.25, &[])],
            &[tokyo(), osaka()],
        );

        assert_eq!(
            message,
            "東京\n最高気温 : 21.3度\n最低気温 : 14.0度\n雨が降りそうな時間帯 : 9:00 \n\
             \n\
             大阪\n最高気温 : 25.0度\n最低気温 : 18.3度\n"
        );
        assert_eq!(message.matches("\n\n").count(), 1);
        assert!(!message.ends_with("\n\n"));
    }

    #[test]
    fn three_locations_separated_between_each() {
        let third = Location::new("札幌", 43.06, 141.35).unwrap();
        let message = build(
            &[response(1.0, 0.0, &[]), response(2.0, 0.0, &[]), response(3.0, 0.0, &[])],
            &[tokyo(), osaka(), third],
        );

        assert_eq!(message.matches("\n\n").count(), 2);
        assert!(message.starts_with("東京\n"));
        assert!(message.ends_with("最低気温 : 0.0度\n"));
    }

    #[test]
    fn build_is_deterministic() {
        let responses = [response(21.34, 14.0, &[(3, 45.0)]), response(25.0, 18.0, &[(22, 99.0)])];
        let locations = [tokyo(), osaka()];

        assert_eq!(build(&responses, &locations), build(&responses, &locations));
    }
}
