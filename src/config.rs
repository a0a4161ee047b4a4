//! Startup configuration for the engine and worker pool

use crate::error::{Result, SegregationError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

// Names are interpolated into engine source, so only plain identifiers pass.
static MODULE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$").unwrap()
});

static FUNCTION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Which engine module to load and how the pool runs it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Module imported before every call
    pub module: String,

    /// Function returning one marker per line
    pub split_function: String,

    /// Function returning `(body, signature)`
    pub signature_function: String,

    /// Function returning `(body, signature)` given the text and sender
    pub ml_signature_function: String,

    /// Extra directories the engine searches for `module`
    pub search_paths: Vec<PathBuf>,

    /// Worker threads in a [`SegregationPool`](crate::SegregationPool)
    pub workers: usize,

    /// Upper bound on one pooled call, in milliseconds
    pub call_timeout_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            module: "split_email".into(),
            split_function: "splitEmail".into(),
            signature_function: "extractSignature".into(),
            ml_signature_function: "extractSignature_MachineLearning".into(),
            search_paths: Vec::new(),
            workers: std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get),
            call_timeout_ms: None,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| SegregationError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            SegregationError::InvalidConfig(format!("{}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if !MODULE_REGEX.is_match(&self.module) {
            return Err(SegregationError::InvalidConfig(format!(
                "module {:?} is not a dotted identifier",
                self.module
            )));
        }

        for (field, name) in [
            ("split_function", &self.split_function),
            ("signature_function", &self.signature_function),
            ("ml_signature_function", &self.ml_signature_function),
        ] {
            if !FUNCTION_REGEX.is_match(name) {
                return Err(SegregationError::InvalidConfig(format!(
                    "{field} {name:?} is not an identifier"
                )));
            }
        }

        if self.workers == 0 {
            return Err(SegregationError::InvalidConfig(
                "workers must be at least 1".into(),
            ));
        }

        Ok(())
    }

    #[must_use]
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }
}
