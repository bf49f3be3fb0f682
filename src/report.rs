use crate::error::{ClassifierError, ErrorKind};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureStatus {
    Passed,
    /// The call succeeded but predicted another class.
    Mismatch,
    /// The call itself failed.
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&ClassifierError> for ErrorDetail {
    fn from(err: &ClassifierError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixtureOutcome {
    pub name: String,
    pub expected_class_id: usize,
    pub status: FixtureStatus,
    pub actual_class_id: Option<usize>,
    pub label: Option<String>,
    pub confidence: Option<f32>,
    /// Wall-clock time of the final classify call.
    pub latency_ms: f64,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl FixtureOutcome {
    pub fn passed(&self) -> bool {
        self.status == FixtureStatus::Passed
    }
}

/// Statistics over calls that returned a prediction. Failed calls are excluded
/// so a timeout never reads as a slow success.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Default)]
pub struct LatencySummary {
    pub samples: usize,
    pub mean_ms: f64,
    pub p95_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

impl LatencySummary {
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);
        let mean_ms = sorted.iter().sum::<f64>() / sorted.len() as f64;
        Self {
            samples: sorted.len(),
            mean_ms,
            p95_ms: percentile(&sorted, 0.95),
            min_ms: sorted[0],
            max_ms: sorted[sorted.len() - 1],
        }
    }
}

/// Nearest-rank percentile over an ascending slice.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (q * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

pub fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationReport {
    pub backend: String,
    pub generated_at_unix_ms: u128,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub latency: LatencySummary,
    pub success: bool,
    pub fixtures: Vec<FixtureOutcome>,
}

impl VerificationReport {
    /// Aggregates per-fixture outcomes. Called once; the report is immutable after.
    pub fn finalize(backend: &str, fixtures: Vec<FixtureOutcome>) -> Self {
        let passed = fixtures.iter().filter(|f| f.passed()).count();
        let errored = fixtures
            .iter()
            .filter(|f| f.status == FixtureStatus::Error)
            .count();
        let latencies: Vec<f64> = fixtures
            .iter()
            .filter(|f| f.status != FixtureStatus::Error)
            .map(|f| f.latency_ms)
            .collect();
        let generated_at_unix_ms = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        Self {
            backend: backend.to_string(),
            generated_at_unix_ms,
            total: fixtures.len(),
            passed,
            failed: fixtures.len() - passed,
            errored,
            latency: LatencySummary::from_samples(&latencies),
            success: !fixtures.is_empty() && passed == fixtures.len(),
            fixtures,
        }
    }

    pub fn exit_code(&self) -> u8 {
        if self.success { 0 } else { 1 }
    }

    pub fn to_json(&self) -> Result<String, ClassifierError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: &Path) -> Result<(), ClassifierError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Human-readable summary.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Test Results ({})", self.backend);
        let _ = writeln!(out, "{}", "-".repeat(50));
        let _ = writeln!(out, "Total tests: {}", self.total);
        let _ = writeln!(out, "Passed: {}", self.passed);
        let _ = writeln!(out, "Failed: {} ({} errors)", self.failed, self.errored);
        let _ = writeln!(
            out,
            "Latency: mean {:.2} ms, p95 {:.2} ms over {} calls",
            self.latency.mean_ms, self.latency.p95_ms, self.latency.samples
        );
        for f in &self.fixtures {
            let mark = match f.status {
                FixtureStatus::Passed => "PASS",
                FixtureStatus::Mismatch => "FAIL",
                FixtureStatus::Error => "ERROR",
            };
            let _ = writeln!(out, "{}", "-".repeat(50));
            let _ = writeln!(out, "[{mark}] {}", f.name);
            let _ = writeln!(out, "   Expected class: {}", f.expected_class_id);
            if let (Some(id), Some(label), Some(conf)) = (f.actual_class_id, &f.label, f.confidence)
            {
                let _ = writeln!(out, "   Predicted class: {id} ({label})");
                let _ = writeln!(out, "   Confidence: {conf:.4}");
            }
            if let Some(err) = &f.error {
                let _ = writeln!(out, "   Error: {}: {}", err.kind, err.message);
            }
            let _ = writeln!(out, "   Latency: {:.2} ms ({} attempt(s))", f.latency_ms, f.attempts);
        }
        let _ = writeln!(out, "{}", "-".repeat(50));
        let _ = writeln!(out, "Overall: {}", if self.success { "PASSED" } else { "FAILED" });
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(name: &str, status: FixtureStatus, latency_ms: f64) -> FixtureOutcome {
        FixtureOutcome {
            name: name.to_string(),
            expected_class_id: 0,
            status,
            actual_class_id: (status != FixtureStatus::Error).then_some(0),
            label: None,
            confidence: None,
            latency_ms,
            attempts: 1,
            error: (status == FixtureStatus::Error).then(|| ErrorDetail {
                kind: ErrorKind::Timeout,
                message: "No response within 1s".to_string(),
            }),
        }
    }

    #[test]
    fn nearest_rank_percentile() {
        let sorted: Vec<f64> = (1..=20).map(f64::from).collect();
        assert_eq!(percentile(&sorted, 0.95), 19.0);
        assert_eq!(percentile(&[4.0], 0.95), 4.0);
        assert_eq!(percentile(&[], 0.95), 0.0);
    }

    #[test]
    fn errors_fail_the_run_but_not_the_latency_stats() {
        let report = VerificationReport::finalize(
            "fake",
            vec![
                outcome("a", FixtureStatus::Passed, 10.0),
                outcome("b", FixtureStatus::Error, 5000.0),
                outcome("c", FixtureStatus::Passed, 30.0),
            ],
        );
        assert_eq!(report.passed, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errored, 1);
        assert!(!report.success);
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.latency.samples, 2);
        assert_eq!(report.latency.mean_ms, 20.0);
        assert_eq!(report.latency.max_ms, 30.0);
    }

    #[test]
    fn json_report_tags_error_kind() {
        let report = VerificationReport::finalize("fake", vec![outcome("b", FixtureStatus::Error, 1.0)]);
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value["fixtures"][0]["error"]["kind"], "TimeoutError");
        assert_eq!(value["fixtures"][0]["status"], "error");
        assert_eq!(value["success"], false);
    }

    #[test]
    fn empty_run_is_not_a_success() {
        let report = VerificationReport::finalize("fake", Vec::new());
        assert!(!report.success);
        assert!(report.render().contains("Overall: FAILED"));
    }
}
