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

use crate::chat::{ChatError, MessageSink};
use crate::config::Location;
use crate::digest;
use crate::forecast::{FetchError, ForecastSource};
use crate::metrics::DigestMetrics;
use chrono::{Local, NaiveDateTime, NaiveTime, TimeZone};
use std::error;
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{Instrument, Level};

pub const STARTUP_NOTICE: &str = "Botが起動しました";
pub const FETCH_FAILURE_NOTICE: &str = "天気予報を取得できませんでした";
pub const DEFAULT_REST: Duration = Duration::from_secs(24 * 60 * 60);

const TARGET_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Next occurrence of `at`: today if it is still ahead (or exactly now), else tomorrow.
pub fn next_run(now: NaiveDateTime, at: NaiveTime) -> NaiveDateTime {
    let target = now.date().and_time(at);
    if now > target {
        target + chrono::Duration::days(1)
    } else {
        target
    }
}

/// Target to serve after `last` was served.
///
/// That is always the day after `last`, even when the rest ran a little past it (the
/// slot is then simply due now). Only when a whole day has been missed does this fall
/// back to `next_run`, so no slot is ever served twice.
pub fn following_run(now: NaiveDateTime, at: NaiveTime, last: Option<NaiveDateTime>) -> NaiveDateTime {
    match last {
        Some(last) => {
            let following = last + chrono::Duration::days(1);
            if now < following + chrono::Duration::days(1) {
                following
            } else {
                next_run(now, at)
            }
        }
        None => next_run(now, at),
    }
}

/// Seconds since the Unix epoch of a wall-clock time in `tz`.
///
/// A time repeated by a backward transition resolves to its first occurrence. `None`
/// for a time skipped by a forward transition.
pub fn epoch_seconds<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> Option<i64> {
    tz.from_local_datetime(&local).earliest().map(|t| t.timestamp())
}

/// Text of the message announcing when the next digest will be sent.
pub fn announcement(target: NaiveDateTime) -> String {
    format!("次回の送信は{}です", target.format(TARGET_FORMAT))
}

/// Source of local wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    /// Unix timestamp of a wall-clock time read from this clock.
    fn timestamp(&self, local: NaiveDateTime) -> Option<i64>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn timestamp(&self, local: NaiveDateTime) -> Option<i64> {
        epoch_seconds(&Local, local)
    }
}

/// What to do when the forecast can't be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log the failure and skip the cycle without telling the channel.
    #[default]
    LogOnly,
    /// Log the failure and post a short notice to the channel.
    Notify,
}

/// Result of a cycle that didn't hit an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Sent,
    Skipped,
}

#[derive(Debug)]
pub enum CycleError {
    Fetch(FetchError),
    Send(ChatError),
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch(e) => write!(f, "fetch failed: {}", e),
            Self::Send(e) => write!(f, "send failed: {}", e),
        }
    }
}

impl error::Error for CycleError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Fetch(e) => Some(e),
            Self::Send(e) => Some(e),
        }
    }
}

/// Everything one run needs: where forecasts come from, where messages go, and
/// which locations to report on.
#[derive(Debug)]
pub struct DigestJob<F, S> {
    source: F,
    sink: S,
    locations: Vec<Location>,
    policy: FailurePolicy,
    metrics: DigestMetrics,
}

impl<F, S> DigestJob<F, S>
where
    F: ForecastSource,
    S: MessageSink,
{
    pub fn new(source: F, sink: S, locations: Vec<Location>, policy: FailurePolicy, metrics: DigestMetrics) -> Self {
        DigestJob {
            source,
            sink,
            locations,
            policy,
            metrics,
        }
    }

    /// Fetch, build, and send a single digest.
    ///
    /// A failed fetch never produces a digest. With `FailurePolicy::Notify` a short
    /// notice is posted instead, and the cycle is still reported as skipped unless that
    /// notice can't be delivered either.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, CycleError> {
        self.metrics.cycle();

        let responses = match self.source.fetch().await {
            Ok(r) => r,
            Err(e) => {
                self.metrics.fetch_failed();
                tracing::error!(message = "failed to fetch forecast", error = %e);
                return self.on_fetch_failure(e).await;
            }
        };

        let message = digest::build(&responses, &self.locations);
        tracing::debug!(message = "built digest", locations = self.locations.len(), chars = message.chars().count());

        self.send(&message).await.map_err(CycleError::Send)?;
        self.metrics.digest_sent();
        Ok(CycleOutcome::Sent)
    }

    async fn on_fetch_failure(&self, e: FetchError) -> Result<CycleOutcome, CycleError> {
        match self.policy {
            FailurePolicy::LogOnly => Ok(CycleOutcome::Skipped),
            FailurePolicy::Notify => match self.send(FETCH_FAILURE_NOTICE).await {
                Ok(()) => Ok(CycleOutcome::Skipped),
                Err(send) => {
                    tracing::error!(message = "failed to send fetch failure notice", error = %send);
                    Err(CycleError::Fetch(e))
                }
            },
        }
    }

    /// Send a message, counting and returning any failure.
    pub async fn send(&self, content: &str) -> Result<(), ChatError> {
        let res = self.sink.send(content).await;
        if res.is_err() {
            self.metrics.send_failed();
        }

        res
    }
}

/// Runs a `DigestJob` once per day at a fixed local time until told to stop.
#[derive(Debug)]
pub struct Scheduler<C, F, S> {
    clock: C,
    send_at: NaiveTime,
    rest: Duration,
    job: DigestJob<F, S>,
    metrics: DigestMetrics,
}

impl<C, F, S> Scheduler<C, F, S>
where
    C: Clock,
    F: ForecastSource,
    S: MessageSink,
{
    pub fn new(clock: C, send_at: NaiveTime, rest: Duration, job: DigestJob<F, S>, metrics: DigestMetrics) -> Self {
        Scheduler {
            clock,
            send_at,
            rest,
            job,
            metrics,
        }
    }

    /// Post the startup notice, then loop until `shutdown` fires.
    ///
    /// Each iteration announces the next run, sleeps until it, runs the job, then
    /// rests for the configured period. Failures inside an iteration are logged and
    /// never end the loop.
    pub async fn run(&self, mut shutdown: watch::Receiver<()>) {
        if let Err(e) = self.job.send(STARTUP_NOTICE).await {
            tracing::error!(message = "failed to send startup notice", error = %e);
        }

        let mut last = None;
        loop {
            let now = self.clock.now();
            let target = following_run(now, self.send_at, last);
            let wait = (target - now).to_std().unwrap_or(Duration::ZERO);
            match self.clock.timestamp(target) {
                Some(ts) => self.metrics.next_run(ts),
                None => tracing::warn!(message = "next run falls in a skipped local time", target = %target),
            }

            tracing::info!(message = "next digest scheduled", target = %target, wait_secs = wait.as_secs());
            if let Err(e) = self.job.send(&announcement(target)).await {
                tracing::error!(message = "failed to send schedule announcement", error = %e);
            }

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => break,
            }

            match self
                .job
                .run_cycle()
                .instrument(tracing::span!(Level::DEBUG, "digest_cycle"))
                .await
            {
                Ok(CycleOutcome::Sent) => tracing::info!(message = "sent digest", target = %target),
                Ok(CycleOutcome::Skipped) => tracing::warn!(message = "skipped digest", target = %target),
                Err(e) => tracing::error!(message = "digest cycle failed", error = %e),
            }
            last = Some(target);

            tokio::select! {
                _ = tokio::time::sleep(self.rest) => {}
                _ = shutdown.changed() => break,
            }
        }

        tracing::info!("scheduler stopped");
    }
}
