use crate::error::ClassifierError;
use crate::preprocess::ImageInput;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "manifest.json";

/// A labeled image with a known-correct class.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Fixture {
    pub name: String,
    pub image: PathBuf,
    pub expected_class_id: usize,
}

/// Fixtures resolved against their root and ready to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureSet {
    fixtures: Vec<Fixture>,
}

/// A fixture whose image is already in memory.
#[derive(Debug, Clone)]
pub struct LoadedFixture {
    pub fixture: Fixture,
    pub image: ImageInput,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    fixtures: Vec<Fixture>,
}

impl FixtureSet {
    pub fn new(fixtures: Vec<Fixture>) -> Result<Self, ClassifierError> {
        if fixtures.is_empty() {
            return Err(ClassifierError::Fixture("fixture set is empty".to_string()));
        }
        Ok(Self { fixtures })
    }

    /// The ImageNet validation images the classifier is checked against by default.
    pub fn preset(root: &Path) -> Self {
        Self {
            fixtures: vec![
                Fixture {
                    name: "tench".to_string(),
                    image: root.join("n01440764_tench.jpeg"),
                    expected_class_id: 0,
                },
                Fixture {
                    name: "mud_turtle".to_string(),
                    image: root.join("n01667114_mud_turtle.JPEG"),
                    expected_class_id: 35,
                },
            ],
        }
    }

    /// `manifest.json` in `dir` when there is one, otherwise the preset rooted at `dir`.
    pub fn discover(dir: &Path) -> Result<Self, ClassifierError> {
        let manifest = dir.join(MANIFEST_FILE);
        if manifest.is_file() {
            Self::from_manifest(&manifest)
        } else {
            Ok(Self::preset(dir))
        }
    }

    /// Reads a JSON manifest; relative image paths resolve against its directory.
    pub fn from_manifest(path: &Path) -> Result<Self, ClassifierError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ClassifierError::Fixture(format!("cannot read manifest {}: {e}", path.display()))
        })?;
        let manifest: Manifest = serde_json::from_str(&text).map_err(|e| {
            ClassifierError::Fixture(format!("invalid manifest {}: {e}", path.display()))
        })?;
        let root = path.parent().unwrap_or_else(|| Path::new("."));
        let fixtures = manifest
            .fixtures
            .into_iter()
            .map(|mut f| {
                if f.image.is_relative() {
                    f.image = root.join(&f.image);
                }
                f
            })
            .collect();
        Self::new(fixtures)
    }

    pub fn fixtures(&self) -> &[Fixture] {
        &self.fixtures
    }

    pub fn len(&self) -> usize {
        self.fixtures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixtures.is_empty()
    }

    /// Reads every image up front. Any unreadable file fails the whole set.
    pub fn load(&self, max_classes: usize) -> Result<Vec<LoadedFixture>, ClassifierError> {
        self.fixtures
            .iter()
            .map(|fixture| {
                if fixture.expected_class_id >= max_classes {
                    return Err(ClassifierError::Fixture(format!(
                        "fixture {} expects class {} but only {max_classes} exist",
                        fixture.name, fixture.expected_class_id
                    )));
                }
                let image = ImageInput::from_path(&fixture.image).map_err(|e| {
                    ClassifierError::Fixture(format!(
                        "cannot read {} ({}): {e}",
                        fixture.name,
                        fixture.image.display()
                    ))
                })?;
                Ok(LoadedFixture {
                    fixture: fixture.clone(),
                    image,
                })
            })
            .collect()
    }
}
