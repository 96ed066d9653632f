//! Schema Provider
//!
//! Holds the schema in effect and lets it be swapped at runtime. Readers
//! get an `Arc` snapshot; a replacement never affects a snapshot already
//! handed out.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::application::ports::ModelProvider;
use crate::domain::model::ModelContext;

/// Schema file loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ModelLoadError {
    /// File could not be read.
    #[error("failed to read model file {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// File is not a valid model description.
    #[error("failed to parse model file {path}: {source}")]
    Parse {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

/// Read a JSON model description from disk.
///
/// # Errors
///
/// Returns `ModelLoadError` when the file is unreadable or malformed.
pub fn load_model_file(path: &Path) -> Result<ModelContext, ModelLoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| ModelLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    ModelContext::from_json(&text).map_err(|source| ModelLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Model provider backed by a swappable snapshot.
#[derive(Debug)]
pub struct StaticModelProvider {
    current: RwLock<Arc<ModelContext>>,
}

impl StaticModelProvider {
    /// Provider serving `context`.
    #[must_use]
    pub fn new(context: ModelContext) -> Self {
        Self {
            current: RwLock::new(Arc::new(context)),
        }
    }

    /// Install a new schema, as after a reload.
    pub fn replace(&self, context: ModelContext) {
        let modules = context.modules().len();
        *self.current.write() = Arc::new(context);
        tracing::info!(modules, "Schema replaced");
    }
}

impl ModelProvider for StaticModelProvider {
    fn current_model_context(&self) -> Arc<ModelContext> {
        Arc::clone(&self.current.read())
    }
}
