//! Running statistics for a campaign
//!
//! One [`RunStatistics`] is owned by whoever drives the campaign and is
//! passed by `&mut` into the loop; there is no shared or global accumulator.
//! After every [`RunStatistics::record`] call:
//!
//! - the global total equals the sum of per-category totals
//! - `total == successes + failures`, globally and per category
//! - response-time samples exist only for successes

use crate::keys::Category;
use crate::utils::{as_millis_f64, MinMaxExt};
use crate::verify::{Outcome, Transaction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Counters for one category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub total: u64,
    pub successes: u64,
    pub failures: u64,
}

impl CategoryStats {
    fn record(&mut self, success: bool) {
        self.total += 1;
        if success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
    }

    /// Success rate in percent, 0 when nothing was recorded
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.successes as f64 / self.total as f64 * 100.0
    }
}

/// Per-category counters, created on first access
#[derive(Debug, Clone, Default)]
pub struct CategoryTally {
    map: BTreeMap<Category, CategoryStats>,
}

impl CategoryTally {
    /// Counters for `category`, inserting zeroes on first use
    pub fn entry(&mut self, category: Category) -> &mut CategoryStats {
        self.map.entry(category).or_default()
    }

    /// Counters for `category`; zeroes if it was never seen
    pub fn get(&self, category: &Category) -> CategoryStats {
        self.map.get(category).copied().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Category, &CategoryStats)> {
        self.map.iter()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Sum of all category totals
    pub fn total(&self) -> u64 {
        self.map.values().map(|s| s.total).sum()
    }
}

/// Everything needed to replay one failed exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// RFC 3339 timestamp of the failure
    pub timestamp: String,
    pub category: String,
    pub description: String,
    /// Raw input as lowercase hex
    pub input_hex: String,
    /// Raw input as a byte list
    pub input_bytes: Vec<u8>,
    pub expected: String,
    pub actual: String,
    pub outcome: Outcome,
    pub elapsed_ms: f64,
}

impl FailureRecord {
    pub fn from_transaction(tx: &Transaction) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            category: tx.input.category.to_string(),
            description: tx.input.description.clone(),
            input_hex: hex::encode(&tx.input.bytes),
            input_bytes: tx.input.bytes.clone(),
            expected: tx.expected.clone(),
            actual: tx.actual(),
            outcome: tx.outcome,
            elapsed_ms: as_millis_f64(tx.elapsed),
        }
    }
}

/// Accumulated state of one campaign
#[derive(Debug, Clone)]
pub struct RunStatistics {
    started: Instant,
    started_at: DateTime<Utc>,
    total: u64,
    successes: u64,
    failures: u64,
    timeouts: u64,
    unexpected_responses: u64,
    transport_exceptions: u64,
    response_times: Vec<Duration>,
    min_response: Option<Duration>,
    max_response: Option<Duration>,
    categories: CategoryTally,
    failure_log: Vec<FailureRecord>,
}

impl RunStatistics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            started_at: Utc::now(),
            total: 0,
            successes: 0,
            failures: 0,
            timeouts: 0,
            unexpected_responses: 0,
            transport_exceptions: 0,
            response_times: Vec::with_capacity(10_000),
            min_response: None,
            max_response: None,
            categories: CategoryTally::default(),
            failure_log: Vec::new(),
        }
    }

    /// Fold a finished transaction into the statistics
    pub fn record(&mut self, tx: &Transaction) {
        self.tally(tx.input.category, tx.outcome, tx.elapsed);
        if !tx.outcome.is_success() {
            self.failure_log.push(FailureRecord::from_transaction(tx));
        }
    }

    /// Update the counters for one outcome without keeping a failure record
    pub fn tally(&mut self, category: Category, outcome: Outcome, elapsed: Duration) {
        let success = outcome.is_success();
        self.total += 1;
        self.categories.entry(category).record(success);

        if success {
            self.successes += 1;
            self.response_times.push(elapsed);
            self.max_response.update_max(elapsed);
            // A zero sample means the clock rounded; it must not become the minimum
            if !elapsed.is_zero() {
                self.min_response.update_min(elapsed);
            }
            return;
        }

        self.failures += 1;
        match outcome {
            Outcome::Timeout => self.timeouts += 1,
            Outcome::UnexpectedResponse => self.unexpected_responses += 1,
            Outcome::TransportException => self.transport_exceptions += 1,
            Outcome::Success => {}
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn successes(&self) -> u64 {
        self.successes
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts
    }

    pub fn unexpected_responses(&self) -> u64 {
        self.unexpected_responses
    }

    pub fn transport_exceptions(&self) -> u64 {
        self.transport_exceptions
    }

    pub fn categories(&self) -> &CategoryTally {
        &self.categories
    }

    pub fn failure_log(&self) -> &[FailureRecord] {
        &self.failure_log
    }

    pub fn response_times(&self) -> &[Duration] {
        &self.response_times
    }

    pub fn min_response_time(&self) -> Option<Duration> {
        self.min_response
    }

    pub fn max_response_time(&self) -> Option<Duration> {
        self.max_response
    }

    /// Inputs per second since the statistics were created
    pub fn throughput(&self) -> f64 {
        self.throughput_over(self.elapsed())
    }

    /// Inputs per second over an explicit window
    pub fn throughput_over(&self, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs > 0.0 {
            self.total as f64 / secs
        } else {
            0.0
        }
    }

    /// Mean response time of successful exchanges
    pub fn average_response_time(&self) -> Duration {
        if self.response_times.is_empty() {
            return Duration::ZERO;
        }
        self.response_times.iter().sum::<Duration>() / self.response_times.len() as u32
    }

    /// Success rate in percent, 0 for an empty run
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.successes as f64 / self.total as f64 * 100.0
    }

    pub fn category_success_rate(&self, category: &Category) -> f64 {
        self.categories.get(category).success_rate()
    }

    /// Population standard deviation of response times
    pub fn response_time_std_dev(&self) -> Option<Duration> {
        if self.response_times.len() < 2 {
            return None;
        }
        let mean = self.average_response_time().as_secs_f64();
        let variance = self
            .response_times
            .iter()
            .map(|d| {
                let diff = d.as_secs_f64() - mean;
                diff * diff
            })
            .sum::<f64>()
            / self.response_times.len() as f64;
        Some(Duration::from_secs_f64(variance.sqrt()))
    }

    /// Nearest-rank percentile (`p` in 0..=100) of response times
    pub fn response_time_percentile(&self, p: f64) -> Option<Duration> {
        if self.response_times.is_empty() {
            return None;
        }
        let mut sorted = self.response_times.clone();
        sorted.sort_unstable();
        let rank = (p.clamp(0.0, 100.0) / 100.0 * sorted.len() as f64).ceil() as usize;
        Some(sorted[rank.saturating_sub(1).min(sorted.len() - 1)])
    }
}

impl Default for RunStatistics {
    fn default() -> Self {
        Self::new()
    }
}
