//! Run report and failure log export

use crate::campaign::CampaignState;
use crate::stats::{FailureRecord, RunStatistics};
use crate::utils::{as_millis_f64, format_hms};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

/// Complete run report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Report metadata
    pub metadata: ReportMetadata,
    /// Run summary
    pub summary: RunSummary,
    /// Response-time figures
    pub performance: Performance,
    /// Failure counts by kind
    pub errors: ErrorBreakdown,
    /// Per-category statistics keyed by category label
    pub categories: BTreeMap<String, CategoryEntry>,
    /// The most recent failures
    pub recent_failures: Vec<FailureRecord>,
}

/// Report metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub generated_at: String,
    pub version: String,
    pub strategy: String,
    /// Seed that reproduces the input sequence
    pub seed: u64,
    pub final_state: CampaignState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub start_time: String,
    pub end_time: String,
    pub duration_seconds: f64,
    pub duration_hours: f64,
    pub total_inputs: u64,
    pub successful_inputs: u64,
    pub failed_inputs: u64,
    pub success_rate: f64,
    pub throughput_per_second: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Performance {
    pub average_response_time_ms: f64,
    pub min_response_time_ms: f64,
    pub max_response_time_ms: f64,
    pub std_dev_ms: Option<f64>,
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBreakdown {
    pub timeouts: u64,
    pub unexpected_responses: u64,
    pub transport_exceptions: u64,
    pub total_failures: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryEntry {
    pub total: u64,
    pub successes: u64,
    pub failures: u64,
    pub success_rate: f64,
}

/// How the run was configured and how it ended
#[derive(Debug, Clone)]
pub struct RunInfo {
    pub strategy: String,
    pub seed: u64,
    pub final_state: CampaignState,
}

fn ms(d: Option<Duration>) -> f64 {
    d.map(as_millis_f64).unwrap_or(0.0)
}

impl RunReport {
    /// Build a report from the statistics, embedding the last `recent` failures
    pub fn new(stats: &RunStatistics, info: &RunInfo, recent: usize) -> Self {
        let elapsed = stats.elapsed();
        let now: DateTime<Utc> = Utc::now();

        let categories = stats
            .categories()
            .iter()
            .map(|(category, c)| {
                (
                    category.to_string(),
                    CategoryEntry {
                        total: c.total,
                        successes: c.successes,
                        failures: c.failures,
                        success_rate: c.success_rate(),
                    },
                )
            })
            .collect();

        let log = stats.failure_log();
        let recent_failures = log[log.len().saturating_sub(recent)..].to_vec();

        Self {
            metadata: ReportMetadata {
                generated_at: now.to_rfc3339(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                strategy: info.strategy.clone(),
                seed: info.seed,
                final_state: info.final_state,
            },
            summary: RunSummary {
                start_time: stats.started_at().to_rfc3339(),
                end_time: now.to_rfc3339(),
                duration_seconds: elapsed.as_secs_f64(),
                duration_hours: elapsed.as_secs_f64() / 3600.0,
                total_inputs: stats.total(),
                successful_inputs: stats.successes(),
                failed_inputs: stats.failures(),
                success_rate: stats.success_rate(),
                throughput_per_second: stats.throughput_over(elapsed),
            },
            performance: Performance {
                average_response_time_ms: as_millis_f64(stats.average_response_time()),
                min_response_time_ms: ms(stats.min_response_time()),
                max_response_time_ms: ms(stats.max_response_time()),
                std_dev_ms: stats.response_time_std_dev().map(as_millis_f64),
                p50_ms: stats.response_time_percentile(50.0).map(as_millis_f64),
                p95_ms: stats.response_time_percentile(95.0).map(as_millis_f64),
                p99_ms: stats.response_time_percentile(99.0).map(as_millis_f64),
            },
            errors: ErrorBreakdown {
                timeouts: stats.timeouts(),
                unexpected_responses: stats.unexpected_responses(),
                transport_exceptions: stats.transport_exceptions(),
                total_failures: stats.failures(),
            },
            categories,
            recent_failures,
        }
    }

    /// Export report to JSON file
    pub fn export_json(&self, path: &Path) -> std::io::Result<()> {
        write_json(self, path)
    }

    /// Export report to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Human-readable summary
    pub fn to_text(&self) -> String {
        let s = &self.summary;
        let p = &self.performance;
        let e = &self.errors;
        let rule = "=".repeat(70);
        let mut out = String::new();

        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "FUZZ TESTING SUMMARY");
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Duration: {}",
            format_hms(Duration::from_secs_f64(s.duration_seconds.max(0.0)))
        );
        let _ = writeln!(out, "Strategy: {} (seed {})", self.metadata.strategy, self.metadata.seed);
        let _ = writeln!(out, "Total Inputs: {}", s.total_inputs);
        let _ = writeln!(out, "Successful: {} ({:.2}%)", s.successful_inputs, s.success_rate);
        let _ = writeln!(out, "Failed: {}", s.failed_inputs);
        let _ = writeln!(out, "  - Timeouts: {}", e.timeouts);
        let _ = writeln!(out, "  - Unexpected: {}", e.unexpected_responses);
        let _ = writeln!(out, "  - Transport: {}", e.transport_exceptions);
        let _ = writeln!(out);
        let _ = writeln!(out, "Performance:");
        let _ = writeln!(out, "  Throughput: {:.2} inputs/sec", s.throughput_per_second);
        let _ = writeln!(out, "  Avg Response Time: {:.2}ms", p.average_response_time_ms);
        let _ = writeln!(out, "  Min Response Time: {:.2}ms", p.min_response_time_ms);
        let _ = writeln!(out, "  Max Response Time: {:.2}ms", p.max_response_time_ms);
        if let Some(p95) = p.p95_ms {
            let _ = writeln!(out, "  P95 Response Time: {:.2}ms", p95);
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "Category Breakdown:");
        let mut rows: Vec<_> = self.categories.iter().collect();
        rows.sort_by(|a, b| b.1.total.cmp(&a.1.total).then_with(|| a.0.cmp(b.0)));
        for (name, c) in rows {
            let share = if s.total_inputs > 0 {
                c.total as f64 / s.total_inputs as f64 * 100.0
            } else {
                0.0
            };
            let _ = writeln!(
                out,
                "  {:24} {:7} ({:5.1}%)  ok {:6.2}%",
                name, c.total, share, c.success_rate
            );
        }

        if !self.recent_failures.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Recent Failures (last 10):");
            let start = self.recent_failures.len().saturating_sub(10);
            for f in &self.recent_failures[start..] {
                let input: String = f.input_hex.chars().take(20).collect();
                let _ = writeln!(
                    out,
                    "  [{}] {:15} Input: {} Error: {}",
                    f.timestamp, f.category, input, f.outcome
                );
            }
        }

        let _ = writeln!(out, "{}", rule);
        out
    }
}

/// Metadata of the failure log document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureLogMetadata {
    pub generated_at: String,
    pub total_failures: u64,
    pub total_transactions: u64,
}

/// Full ordered list of failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureLog {
    pub metadata: FailureLogMetadata,
    pub failures: Vec<FailureRecord>,
}

impl FailureLog {
    pub fn new(stats: &RunStatistics) -> Self {
        Self {
            metadata: FailureLogMetadata {
                generated_at: Utc::now().to_rfc3339(),
                total_failures: stats.failures(),
                total_transactions: stats.total(),
            },
            failures: stats.failure_log().to_vec(),
        }
    }

    pub fn export_json(&self, path: &Path) -> std::io::Result<()> {
        write_json(self, path)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn write_json<T: Serialize>(value: &T, path: &Path) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let mut file = File::create(path)?;
    file.write_all(json.as_bytes())?;
    Ok(())
}
