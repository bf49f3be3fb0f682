use crate::error::ClassifierError;
use crate::model_config::NUM_CLASSES;
use std::path::Path;

const IMAGENET_CLASSES: &str = include_str!("../assets/imagenet_classes.txt");

/// Index-addressed class names. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassVocabulary {
    names: Vec<String>,
}

impl ClassVocabulary {
    /// The ImageNet-1k label list bundled with the crate.
    pub fn imagenet() -> Self {
        Self {
            names: IMAGENET_CLASSES.lines().map(str::to_string).collect(),
        }
    }

    /// One name per line; blank trailing lines are ignored.
    pub fn from_text(text: &str) -> Result<Self, ClassifierError> {
        let names: Vec<String> = text
            .trim_end()
            .lines()
            .map(|l| l.trim().to_string())
            .collect();
        if names.len() != NUM_CLASSES {
            return Err(ClassifierError::Vocabulary(format!(
                "expected {NUM_CLASSES} class names, found {}",
                names.len()
            )));
        }
        if let Some(idx) = names.iter().position(String::is_empty) {
            return Err(ClassifierError::Vocabulary(format!(
                "class {idx} has an empty name"
            )));
        }
        Ok(Self { names })
    }

    pub fn from_file(path: &Path) -> Result<Self, ClassifierError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_text(&text)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn label(&self, class_id: usize) -> Option<&str> {
        self.names.get(class_id).map(String::as_str)
    }

    pub fn class_id(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}
