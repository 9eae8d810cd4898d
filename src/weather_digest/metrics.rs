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

use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

/// Counters describing what the bot has done, not the weather itself.
///
/// All metrics are created and registered upon call to `DigestMetrics::new()` and share
/// the prefix "weather_digest_". Clones share the same underlying values.
#[derive(Debug, Clone, Default)]
pub struct DigestMetrics {
    cycles: Counter,
    digests_sent: Counter,
    fetch_failures: Counter,
    send_failures: Counter,
    next_run: Gauge,
}

impl DigestMetrics {
    const PREFIX: &'static str = "weather_digest";

    pub fn new(reg: &mut Registry) -> Self {
        let metrics = Self::default();
        let sub = reg.sub_registry_with_prefix(Self::PREFIX);

        sub.register("cycles", "Scheduled runs started", metrics.cycles.clone());
        sub.register("digests_sent", "Digest messages delivered", metrics.digests_sent.clone());
        sub.register("fetch_failures", "Forecast fetches that failed", metrics.fetch_failures.clone());
        sub.register("send_failures", "Chat messages that could not be sent", metrics.send_failures.clone());
        sub.register(
            "next_run_timestamp_seconds",
            "Time of the next scheduled run as seconds since the Unix epoch",
            metrics.next_run.clone(),
        );

        metrics
    }

    pub fn cycle(&self) {
        self.cycles.inc();
    }

    pub fn digest_sent(&self) {
        self.digests_sent.inc();
    }

    pub fn fetch_failed(&self) {
        self.fetch_failures.inc();
    }

    pub fn send_failed(&self) {
        self.send_failures.inc();
    }

    pub fn next_run(&self, timestamp: i64) {
        self.next_run.set(timestamp);
    }

    pub fn next_run_timestamp(&self) -> i64 {
        self.next_run.get()
    }

    pub fn digests_sent(&self) -> u64 {
        self.digests_sent.get()
    }

    pub fn fetch_failures(&self) -> u64 {
        self.fetch_failures.get()
    }

    pub fn send_failures(&self) -> u64 {
        self.send_failures.get()
    }
}
