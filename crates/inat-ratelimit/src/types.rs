//! Rates and bucket state

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Largest multiple of the interval `Rate::from_fraction` scales a fractional rate to
const MAX_INTERVAL_MULTIPLE: u32 = 100;

/// A maximum number of requests allowed within a sliding time window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    pub limit: u32,
    pub interval: Duration,
}

impl Rate {
    pub const fn new(limit: u32, interval: Duration) -> Self {
        Self { limit, interval }
    }

    /// Build a rate from a possibly fractional number of requests per `interval`.
    ///
    /// Rates below one are stretched into one request per longer interval, so `0.5` per
    /// second becomes one request every two seconds. Other fractions are scaled to a whole
    /// number of requests over a multiple of `interval`, so `2.5` per second becomes five
    /// requests every two seconds. A fraction with no small multiple keeps its whole part.
    pub fn from_fraction(requests: f64, interval: Duration) -> Self {
        if requests <= 0.0 || !requests.is_finite() {
            return Self::new(0, interval);
        }
        if requests < 1.0 {
            return Self::new(1, interval.mul_f64(1.0 / requests));
        }
        let limit = |scaled: f64| scaled.round().min(f64::from(u32::MAX)) as u32;
        for multiple in 1..=MAX_INTERVAL_MULTIPLE {
            let scaled = requests * f64::from(multiple);
            if (scaled - scaled.round()).abs() < 1e-6 {
                return Self::new(limit(scaled), interval * multiple);
            }
        }
        Self::new(limit(requests.floor()), interval)
    }

    pub fn per_second(requests: f64) -> Self {
        Self::from_fraction(requests, Duration::from_secs(1))
    }

    pub fn per_minute(requests: f64) -> Self {
        Self::from_fraction(requests, Duration::from_secs(60))
    }

    pub fn per_day(requests: f64) -> Self {
        Self::from_fraction(requests, Duration::from_secs(86_400))
    }

    /// A zero limit disables the window
    pub fn is_enabled(&self) -> bool {
        self.limit > 0 && !self.interval.is_zero()
    }

    /// Key used to store this window's request log
    pub(crate) fn key(&self) -> String {
        format!("{}/{}ms", self.limit, self.interval.as_millis())
    }

    fn interval_micros(&self) -> i64 {
        self.interval.as_micros().min(i64::MAX as u128) as i64
    }
}

/// Result of a single attempt to take a slot from a bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    /// The request was recorded in every window
    Granted,
    /// No slot is free; the earliest one opens after this delay
    Wait(Duration),
}

/// Request logs for every bucket, keyed by bucket name and then by window
///
/// Timestamps are microseconds since the Unix epoch so the state stays meaningful when it
/// is shared through a file between processes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BucketState {
    buckets: HashMap<String, HashMap<String, VecDeque<i64>>>,
}

impl BucketState {
    /// Take one slot in every window of `bucket`, or report how long until one is free.
    ///
    /// Either every window records the request or none does.
    pub fn try_take(&mut self, bucket: &str, rates: &[Rate], now: i64) -> Acquisition {
        let windows = self.buckets.entry(bucket.to_string()).or_default();
        let mut wait_micros: i64 = 0;

        for rate in rates.iter().filter(|r| r.is_enabled()) {
            let log = windows.entry(rate.key()).or_default();
            let interval = rate.interval_micros();
            while log.front().is_some_and(|&t| t.saturating_add(interval) <= now) {
                log.pop_front();
            }
            if log.len() >= rate.limit as usize {
                // The slot reopens when the oldest request still counted leaves the window
                let index = log.len() - rate.limit as usize;
                let opens_at = log[index].saturating_add(interval);
                wait_micros = wait_micros.max(opens_at - now);
            }
        }

        if wait_micros > 0 {
            return Acquisition::Wait(Duration::from_micros(wait_micros as u64));
        }

        for rate in rates.iter().filter(|r| r.is_enabled()) {
            if let Some(log) = windows.get_mut(&rate.key()) {
                log.push_back(now);
            }
        }
        Acquisition::Granted
    }

    /// Drop windows and buckets whose requests have all aged out of `rates`
    pub fn prune(&mut self, rates: &[Rate], now: i64) {
        let longest = rates
            .iter()
            .filter(|r| r.is_enabled())
            .map(Rate::interval_micros)
            .max()
            .unwrap_or(0);
        for windows in self.buckets.values_mut() {
            windows.retain(|_, log| {
                log.back()
                    .is_some_and(|&last| last.saturating_add(longest) > now)
            });
        }
        self.buckets.retain(|_, windows| !windows.is_empty());
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Number of requests currently logged for a bucket's window
    pub fn logged(&self, bucket: &str, rate: &Rate) -> usize {
        self.buckets
            .get(bucket)
            .and_then(|w| w.get(&rate.key()))
            .map_or(0, VecDeque::len)
    }
}
