//! Periodic probing of a deployment with one known image.

use crate::harness::timed;
use crate::preprocess::ImageInput;
use crate::report::{ErrorDetail, LatencySummary, duration_ms};
use crate::service::PredictionService;
use serde::Serialize;
use std::time::{Duration, Instant, SystemTime};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy)]
pub struct MonitorOptions {
    pub duration: Duration,
    pub interval: Duration,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(60),
            interval: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Healthy,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorSample {
    pub timestamp_unix_ms: u128,
    pub status: ProbeStatus,
    pub latency_ms: f64,
    pub class_id: Option<usize>,
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorReport {
    pub backend: String,
    pub healthy: usize,
    pub errors: usize,
    pub latency: LatencySummary,
    pub samples: Vec<MonitorSample>,
}

impl MonitorReport {
    /// Healthy only if every probe succeeded and, when given, matched `expected`.
    pub fn success(&self, expected_class_id: Option<usize>) -> bool {
        !self.samples.is_empty()
            && self.errors == 0
            && expected_class_id
                .is_none_or(|id| self.samples.iter().all(|s| s.class_id == Some(id)))
    }
}

/// Probes every `interval` until `duration` has passed. Calls are sequential.
pub fn monitor(
    service: &PredictionService,
    probe: &ImageInput,
    options: MonitorOptions,
) -> MonitorReport {
    let deadline = Instant::now() + options.duration;
    let mut samples = Vec::new();

    while Instant::now() < deadline {
        let (result, elapsed) = timed(|| service.classify(probe));
        let timestamp_unix_ms = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let latency_ms = duration_ms(elapsed);
        let sample = match result {
            Ok(p) => {
                info!(class_id = p.class_id, confidence = p.confidence, latency_ms, "probe healthy");
                MonitorSample {
                    timestamp_unix_ms,
                    status: ProbeStatus::Healthy,
                    latency_ms,
                    class_id: Some(p.class_id),
                    confidence: Some(p.confidence),
                    error: None,
                }
            }
            Err(err) => {
                warn!(kind = %err.kind(), error = %err, "probe failed");
                MonitorSample {
                    timestamp_unix_ms,
                    status: ProbeStatus::Error,
                    latency_ms,
                    class_id: None,
                    confidence: None,
                    error: Some(ErrorDetail::from(&err)),
                }
            }
        };
        samples.push(sample);

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep(options.interval.min(deadline - now));
    }

    let latencies: Vec<f64> = samples
        .iter()
        .filter(|s| s.status == ProbeStatus::Healthy)
        .map(|s| s.latency_ms)
        .collect();
    let healthy = latencies.len();
    MonitorReport {
        backend: service.backend_name().to_string(),
        healthy,
        errors: samples.len() - healthy,
        latency: LatencySummary::from_samples(&latencies),
        samples,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendInput, BackendOutput, InferenceBackend, InputMode};
    use crate::error::ClassifierError;
    use crate::preprocess::Preprocessor;
    use crate::vocabulary::ClassVocabulary;
    use std::sync::Arc;

    struct Flaky;

    impl InferenceBackend for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        fn input_mode(&self) -> InputMode {
            InputMode::Image
        }

        fn infer(&self, _input: BackendInput<'_>) -> Result<BackendOutput, ClassifierError> {
            Err(ClassifierError::Server {
                status: 503,
                body: "warming up".to_string(),
            })
        }
    }

    #[test]
    fn failing_probes_are_recorded_not_raised() {
        let service = PredictionService::new(
            Box::new(Flaky),
            Preprocessor::default(),
            Arc::new(ClassVocabulary::imagenet()),
        );
        let probe = ImageInput::Encoded {
            file_name: "probe.jpg".to_string(),
            bytes: vec![1, 2, 3],
        };
        let report = monitor(
            &service,
            &probe,
            MonitorOptions {
                duration: Duration::from_millis(30),
                interval: Duration::from_millis(10),
            },
        );
        assert!(!report.samples.is_empty());
        assert_eq!(report.healthy, 0);
        assert_eq!(report.errors, report.samples.len());
        assert!(!report.success(None));
        assert_eq!(report.latency.samples, 0);
    }
}
