//! Drift check: the same fixtures through two services, side by side.

use crate::error::ClassifierError;
use crate::fixtures::FixtureSet;
use crate::harness::timed;
use crate::prediction::PredictionResult;
use crate::report::{ErrorDetail, duration_ms};
use crate::service::PredictionService;
use serde::Serialize;
use std::fmt::Write as _;
use tracing::{info, warn};

pub const DEFAULT_TOLERANCE: f32 = 1e-3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Side {
    pub class_id: Option<usize>,
    pub confidence: Option<f32>,
    pub latency_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl Side {
    fn from_result(result: &Result<PredictionResult, ClassifierError>, latency_ms: f64) -> Self {
        match result {
            Ok(p) => Self {
                class_id: Some(p.class_id),
                confidence: Some(p.confidence),
                latency_ms,
                error: None,
            },
            Err(e) => Self {
                class_id: None,
                confidence: None,
                latency_ms,
                error: Some(ErrorDetail::from(e)),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriftEntry {
    pub name: String,
    pub expected_class_id: usize,
    pub reference: Side,
    pub candidate: Side,
    pub confidence_delta: Option<f32>,
    pub consistent: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriftReport {
    pub reference_backend: String,
    pub candidate_backend: String,
    pub tolerance: f32,
    pub consistent: usize,
    pub drifted: usize,
    pub entries: Vec<DriftEntry>,
}

impl DriftReport {
    pub fn success(&self) -> bool {
        self.drifted == 0 && !self.entries.is_empty()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Drift check: {} vs {} (tolerance {})",
            self.reference_backend, self.candidate_backend, self.tolerance
        );
        for e in &self.entries {
            let fmt_side = |s: &Side| match (s.class_id, s.confidence, &s.error) {
                (Some(id), Some(c), _) => format!("class {id} @ {c:.4} in {:.2} ms", s.latency_ms),
                (_, _, Some(err)) => format!("{}: {}", err.kind, err.message),
                _ => "no result".to_string(),
            };
            let _ = writeln!(
                out,
                "[{}] {}\n   {}: {}\n   {}: {}",
                if e.consistent { "SAME" } else { "DRIFT" },
                e.name,
                self.reference_backend,
                fmt_side(&e.reference),
                self.candidate_backend,
                fmt_side(&e.candidate),
            );
        }
        let _ = writeln!(out, "Consistent: {}, drifted: {}", self.consistent, self.drifted);
        out
    }
}

/// Classifies every fixture with both services, reference first.
pub fn cross_check(
    reference: &PredictionService,
    candidate: &PredictionService,
    fixtures: &FixtureSet,
    tolerance: f32,
) -> Result<DriftReport, ClassifierError> {
    let loaded = fixtures.load(reference.vocabulary().len())?;
    let mut entries = Vec::with_capacity(loaded.len());

    for item in &loaded {
        let (ref_result, ref_elapsed) = timed(|| reference.classify(&item.image));
        let (cand_result, cand_elapsed) = timed(|| candidate.classify(&item.image));

        let confidence_delta = match (&ref_result, &cand_result) {
            (Ok(a), Ok(b)) => Some((a.confidence - b.confidence).abs()),
            _ => None,
        };
        let consistent = match (&ref_result, &cand_result) {
            (Ok(a), Ok(b)) => a.class_id == b.class_id && confidence_delta.is_some_and(|d| d <= tolerance),
            _ => false,
        };
        if !consistent {
            warn!(fixture = %item.fixture.name, delta = ?confidence_delta, "environments disagree");
        }

        entries.push(DriftEntry {
            name: item.fixture.name.clone(),
            expected_class_id: item.fixture.expected_class_id,
            reference: Side::from_result(&ref_result, duration_ms(ref_elapsed)),
            candidate: Side::from_result(&cand_result, duration_ms(cand_elapsed)),
            confidence_delta,
            consistent,
        });
    }

    let consistent = entries.iter().filter(|e| e.consistent).count();
    let report = DriftReport {
        reference_backend: reference.backend_name().to_string(),
        candidate_backend: candidate.backend_name().to_string(),
        tolerance,
        consistent,
        drifted: entries.len() - consistent,
        entries,
    };
    info!(consistent = report.consistent, drifted = report.drifted, "drift check finished");
    Ok(report)
}
