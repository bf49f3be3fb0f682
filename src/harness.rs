//! Runs a [`PredictionService`] over a fixture set and builds a [`VerificationReport`].
//!
//! ```text
//! Init -> LoadingFixtures -> Running -> Reporting -> Done
//!               \
//!                -> Failed   (fixtures unreadable)
//! ```
//!
//! Per-fixture failures, including transport errors, are recorded and the run
//! moves on; only setup errors end in `Failed`.

use crate::error::ClassifierError;
use crate::fixtures::{FixtureSet, LoadedFixture};
use crate::prediction::PredictionResult;
use crate::report::{ErrorDetail, FixtureOutcome, FixtureStatus, VerificationReport, duration_ms};
use crate::service::PredictionService;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarnessState {
    Init,
    LoadingFixtures,
    Running,
    Reporting,
    Done,
    Failed,
}

impl HarnessState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, HarnessState::Done | HarnessState::Failed)
    }
}

#[derive(Debug, Clone, Default)]
pub struct HarnessOptions {
    /// Extra attempts for fixtures that hit a timeout or network error.
    pub retries: u32,
}

/// Times exactly one closure call.
pub fn timed<T>(f: impl FnOnce() -> T) -> (T, Duration) {
    let start = Instant::now();
    let value = f();
    (value, start.elapsed())
}

pub struct VerificationHarness<'a> {
    service: &'a PredictionService,
    fixtures: FixtureSet,
    options: HarnessOptions,
    state: HarnessState,
}

impl<'a> VerificationHarness<'a> {
    pub fn new(service: &'a PredictionService, fixtures: FixtureSet, options: HarnessOptions) -> Self {
        Self {
            service,
            fixtures,
            options,
            state: HarnessState::Init,
        }
    }

    pub fn state(&self) -> HarnessState {
        self.state
    }

    fn transition(&mut self, next: HarnessState) {
        debug!(from = ?self.state, to = ?next, "harness state");
        self.state = next;
    }

    pub fn run(&mut self) -> Result<VerificationReport, ClassifierError> {
        if self.state != HarnessState::Init {
            return Err(ClassifierError::Config(format!(
                "harness already ran (state {:?})",
                self.state
            )));
        }

        self.transition(HarnessState::LoadingFixtures);
        let loaded = match self.fixtures.load(self.service.vocabulary().len()) {
            Ok(loaded) => loaded,
            Err(err) => {
                self.transition(HarnessState::Failed);
                return Err(err);
            }
        };
        info!(
            fixtures = loaded.len(),
            backend = self.service.backend_name(),
            "running verification"
        );

        self.transition(HarnessState::Running);
        let outcomes: Vec<FixtureOutcome> = loaded.iter().map(|f| self.evaluate(f)).collect();

        self.transition(HarnessState::Reporting);
        let report = VerificationReport::finalize(self.service.backend_name(), outcomes);
        info!(
            passed = report.passed,
            failed = report.failed,
            mean_ms = report.latency.mean_ms,
            p95_ms = report.latency.p95_ms,
            "verification finished"
        );

        self.transition(HarnessState::Done);
        Ok(report)
    }

    fn evaluate(&self, loaded: &LoadedFixture) -> FixtureOutcome {
        let fixture = &loaded.fixture;
        let mut attempts = 0;
        let (result, elapsed) = loop {
            attempts += 1;
            let (result, elapsed) = timed(|| self.service.classify(&loaded.image));
            let retry = matches!(&result, Err(err) if err.is_transient())
                && attempts <= self.options.retries;
            if !retry {
                break (result, elapsed);
            }
            if let Err(err) = &result {
                warn!(fixture = %fixture.name, attempt = attempts, error = %err, "retrying");
            }
        };
        outcome(fixture.name.clone(), fixture.expected_class_id, result, elapsed, attempts)
    }
}

fn outcome(
    name: String,
    expected_class_id: usize,
    result: Result<PredictionResult, ClassifierError>,
    elapsed: Duration,
    attempts: u32,
) -> FixtureOutcome {
    let latency_ms = duration_ms(elapsed);
    match result {
        Ok(prediction) => {
            let status = if prediction.class_id == expected_class_id {
                FixtureStatus::Passed
            } else {
                warn!(
                    fixture = %name,
                    expected = expected_class_id,
                    actual = prediction.class_id,
                    "class mismatch"
                );
                FixtureStatus::Mismatch
            };
            FixtureOutcome {
                name,
                expected_class_id,
                status,
                actual_class_id: Some(prediction.class_id),
                label: Some(prediction.label),
                confidence: Some(prediction.confidence),
                latency_ms,
                attempts,
                error: None,
            }
        }
        Err(err) => {
            warn!(fixture = %name, kind = %err.kind(), error = %err, "fixture errored");
            FixtureOutcome {
                name,
                expected_class_id,
                status: FixtureStatus::Error,
                actual_class_id: None,
                label: None,
                confidence: None,
                latency_ms,
                attempts,
                error: Some(ErrorDetail::from(&err)),
            }
        }
    }
}
