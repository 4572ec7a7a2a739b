//! Model file discovery.

use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tracing::warn;

use crate::error::StartError;

/// File extension of loadable model files.
pub const MODEL_EXTENSION: &str = "gguf";

/// A model file found in the models directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub size_bytes: u64,
}

/// Normalize a requested model name: bare names get the `.gguf` suffix.
pub fn canonical_model_name(name: &str) -> String {
    let name = name.trim();
    let has_extension = Path::new(name)
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case(MODEL_EXTENSION))
        .unwrap_or(false);
    if has_extension {
        name.to_string()
    } else {
        format!("{}.{}", name, MODEL_EXTENSION)
    }
}

/// Models available in one directory.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    dir: PathBuf,
}

impl ModelCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Model files in the directory, sorted by name.
    ///
    /// A missing or unreadable directory yields an empty list.
    pub fn list(&self) -> Vec<ModelInfo> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot read models directory {:?}: {}", self.dir, e);
                return Vec::new();
            }
        };

        let mut models: Vec<ModelInfo> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let path = entry.path();
                if !is_model_file(&path) {
                    return None;
                }
                let metadata = entry.metadata().ok()?;
                if !metadata.is_file() {
                    return None;
                }
                Some(ModelInfo {
                    name: entry.file_name().to_string_lossy().into_owned(),
                    size_bytes: metadata.len(),
                })
            })
            .collect();

        models.sort_by(|a, b| a.name.cmp(&b.name));
        models
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_ok()
    }

    /// Path of the named model file.
    ///
    /// Names that would escape the directory are treated as unknown.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, StartError> {
        let name = canonical_model_name(name);
        let mut components = Path::new(&name).components();
        let is_plain_file_name = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !is_plain_file_name {
            return Err(StartError::ModelNotFound(name));
        }

        let path = self.dir.join(&name);
        if path.is_file() {
            Ok(path)
        } else {
            Err(StartError::ModelNotFound(name))
        }
    }
}

fn is_model_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case(MODEL_EXTENSION))
        .unwrap_or(false)
}
