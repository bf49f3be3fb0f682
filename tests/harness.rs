mod common;

use classifier_parity::report::FixtureStatus;
use classifier_parity::{
    BackendInput, BackendOutput, ClassifierError, ErrorKind, FixtureSet, HarnessOptions,
    HarnessState, InferenceBackend, InputMode, RemoteClient, RemoteOptions, ScoreVector,
    VerificationHarness,
};
use common::{ColorBackend, StubConfig, StubDeployment, service, write_fixture_dir};
use std::cell::Cell;
use std::time::Duration;
use tempfile::tempdir;

/// Always answers class 1 (goldfish).
struct Goldfish;

impl InferenceBackend for Goldfish {
    fn name(&self) -> &str {
        "goldfish"
    }

    fn input_mode(&self) -> InputMode {
        InputMode::Tensor
    }

    fn infer(&self, _input: BackendInput<'_>) -> Result<BackendOutput, ClassifierError> {
        let mut probs = vec![0.0; 1000];
        probs[1] = 0.6;
        Ok(BackendOutput::Scores(ScoreVector::probabilities(probs)))
    }
}

/// Fails with a network error on the first `failures` calls, then delegates.
struct Unsteady {
    failures: Cell<u32>,
}

impl InferenceBackend for Unsteady {
    fn name(&self) -> &str {
        "unsteady"
    }

    fn input_mode(&self) -> InputMode {
        InputMode::Tensor
    }

    fn infer(&self, input: BackendInput<'_>) -> Result<BackendOutput, ClassifierError> {
        if self.failures.get() > 0 {
            self.failures.set(self.failures.get() - 1);
            return Err(ClassifierError::Network("connection reset".to_string()));
        }
        ColorBackend.infer(input)
    }
}

#[test]
fn all_fixtures_pass_with_correct_backend() {
    let dir = tempdir().unwrap();
    let fixtures = FixtureSet::from_manifest(&write_fixture_dir(dir.path())).unwrap();
    let svc = service(Box::new(ColorBackend));

    let mut harness = VerificationHarness::new(&svc, fixtures, HarnessOptions::default());
    assert_eq!(harness.state(), HarnessState::Init);
    let report = harness.run().unwrap();

    assert_eq!(harness.state(), HarnessState::Done);
    assert!(report.success);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.passed, 2);
    assert_eq!(report.fixtures[0].actual_class_id, Some(0));
    assert_eq!(report.fixtures[0].label.as_deref(), Some("tench"));
    assert!(report.fixtures[0].confidence.unwrap() > 0.0);
    assert_eq!(report.fixtures[1].actual_class_id, Some(35));
    assert_eq!(report.latency.samples, 2);
}

#[test]
fn mismatches_are_recorded_and_the_run_continues() {
    let dir = tempdir().unwrap();
    let fixtures = FixtureSet::from_manifest(&write_fixture_dir(dir.path())).unwrap();
    let svc = service(Box::new(Goldfish));

    let report = VerificationHarness::new(&svc, fixtures, HarnessOptions::default())
        .run()
        .unwrap();

    assert_eq!(report.total, 2);
    assert_eq!(report.failed, 2);
    assert!(report.fixtures.iter().all(|f| f.status == FixtureStatus::Mismatch));
    assert_eq!(report.fixtures[1].actual_class_id, Some(1));
    assert_ne!(report.exit_code(), 0);
}

#[test]
fn unreadable_fixtures_fail_setup() {
    let dir = tempdir().unwrap();
    let svc = service(Box::new(ColorBackend));
    let mut harness =
        VerificationHarness::new(&svc, FixtureSet::preset(dir.path()), HarnessOptions::default());

    let err = harness.run().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Fixture);
    assert_eq!(harness.state(), HarnessState::Failed);
}

#[test]
fn harness_runs_once() {
    let dir = tempdir().unwrap();
    let fixtures = FixtureSet::from_manifest(&write_fixture_dir(dir.path())).unwrap();
    let svc = service(Box::new(ColorBackend));
    let mut harness = VerificationHarness::new(&svc, fixtures, HarnessOptions::default());
    harness.run().unwrap();
    assert!(harness.run().is_err());
}

#[test]
fn remote_timeout_is_reported_per_fixture() {
    let dir = tempdir().unwrap();
    let fixtures = FixtureSet::from_manifest(&write_fixture_dir(dir.path())).unwrap();
    let mut config = StubConfig::predicting(0, 0.9);
    config.delay = Duration::from_secs(3);
    let stub = StubDeployment::start(config);
    let client = RemoteClient::new(RemoteOptions {
        base_url: stub.url.clone(),
        api_key: Some("test_api_key".to_string()),
        timeout: Duration::from_millis(150),
        payload: Default::default(),
    })
    .unwrap();
    let svc = service(Box::new(client));

    let report = VerificationHarness::new(&svc, fixtures, HarnessOptions::default())
        .run()
        .unwrap();

    assert_eq!(report.errored, 2);
    assert!(!report.success);
    assert_ne!(report.exit_code(), 0);
    let first = &report.fixtures[0];
    assert_eq!(first.status, FixtureStatus::Error);
    assert_eq!(first.error.as_ref().unwrap().kind, ErrorKind::Timeout);
    assert_eq!(report.latency.samples, 0);

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["fixtures"][0]["error"]["kind"], "TimeoutError");
}

#[test]
fn transient_failures_are_retried_when_allowed() {
    let dir = tempdir().unwrap();
    let fixtures = FixtureSet::from_manifest(&write_fixture_dir(dir.path())).unwrap();
    let svc = service(Box::new(Unsteady {
        failures: Cell::new(1),
    }));

    let report = VerificationHarness::new(&svc, fixtures, HarnessOptions { retries: 2 })
        .run()
        .unwrap();

    assert!(report.success);
    assert_eq!(report.fixtures[0].attempts, 2);
    assert_eq!(report.fixtures[1].attempts, 1);
}

#[test]
fn without_retries_a_transient_failure_fails_the_fixture() {
    let dir = tempdir().unwrap();
    let fixtures = FixtureSet::from_manifest(&write_fixture_dir(dir.path())).unwrap();
    let svc = service(Box::new(Unsteady {
        failures: Cell::new(1),
    }));

    let report = VerificationHarness::new(&svc, fixtures, HarnessOptions::default())
        .run()
        .unwrap();

    assert_eq!(report.errored, 1);
    assert_eq!(
        report.fixtures[0].error.as_ref().unwrap().kind,
        ErrorKind::Network
    );
    assert_eq!(report.fixtures[1].status, FixtureStatus::Passed);
}
