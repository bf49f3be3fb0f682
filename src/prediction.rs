use crate::error::ClassifierError;
use crate::model_config::ScoreKind;
use crate::vocabulary::ClassVocabulary;
use serde::Serialize;

/// Raw output vector of a backend together with what it declares it holds.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreVector {
    pub values: Vec<f32>,
    pub kind: ScoreKind,
}

impl ScoreVector {
    pub fn logits(values: Vec<f32>) -> Self {
        Self {
            values,
            kind: ScoreKind::Logits,
        }
    }

    pub fn probabilities(values: Vec<f32>) -> Self {
        Self {
            values,
            kind: ScoreKind::Probabilities,
        }
    }

    /// Converts to a probability distribution, applying softmax only to logits.
    pub fn into_probabilities(self) -> Vec<f32> {
        match self.kind {
            ScoreKind::Logits => softmax(&self.values),
            ScoreKind::Probabilities => self.values,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub class_id: usize,
    pub label: String,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<Vec<f32>>,
}

impl PredictionResult {
    /// Argmax and confidence extraction over a full probability vector.
    pub fn from_scores(
        scores: ScoreVector,
        vocabulary: &ClassVocabulary,
    ) -> Result<Self, ClassifierError> {
        let probabilities = scores.into_probabilities();
        let (class_id, confidence) = argmax(&probabilities).ok_or_else(|| {
            ClassifierError::MalformedResponse("empty probability vector".to_string())
        })?;
        Self::from_decision(class_id, confidence, Some(probabilities), vocabulary)
    }

    /// Builds a result from an already-decided class, validating its range.
    pub fn from_decision(
        class_id: usize,
        confidence: f32,
        probabilities: Option<Vec<f32>>,
        vocabulary: &ClassVocabulary,
    ) -> Result<Self, ClassifierError> {
        if !confidence.is_finite() {
            return Err(ClassifierError::MalformedResponse(format!(
                "confidence is not finite: {confidence}"
            )));
        }
        let label = vocabulary.label(class_id).ok_or_else(|| {
            ClassifierError::MalformedResponse(format!(
                "class_id {class_id} outside vocabulary of {}",
                vocabulary.len()
            ))
        })?;
        if let Some(probs) = &probabilities {
            if probs.len() != vocabulary.len() {
                return Err(ClassifierError::ShapeMismatch {
                    what: "probability vector",
                    expected: vec![vocabulary.len()],
                    actual: vec![probs.len()],
                });
            }
            if let Some((top, best)) = argmax(probs) {
                if probs[class_id] < best {
                    return Err(ClassifierError::MalformedResponse(format!(
                        "class_id {class_id} disagrees with probabilities, which peak at {top}"
                    )));
                }
            }
        }
        Ok(Self {
            class_id,
            label: label.to_string(),
            confidence: confidence.clamp(0.0, 1.0),
            probabilities,
        })
    }
}

pub fn softmax(data: &[f32]) -> Vec<f32> {
    let max_val = data.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let exps: Vec<f32> = data.iter().map(|&x| (x - max_val).exp()).collect();
    let sum_exps: f32 = exps.iter().sum();
    exps.into_iter().map(|x| x / sum_exps).collect()
}

/// Index and value of the largest finite element; the first one wins ties.
pub fn argmax(data: &[f32]) -> Option<(usize, f32)> {
    data.iter()
        .copied()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .fold(None, |best, (i, v)| match best {
            Some((_, bv)) if bv >= v => best,
            _ => Some((i, v)),
        })
}
