//! Boundary to the foreign text-classification engine
//!
//! An [`Engine`] is one live interpreter instance. Implementations are
//! deliberately not required to be `Send`: a handle is created, used and
//! closed on a single thread, and `Box<dyn Engine>` cannot leave it.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};

/// A value read back from the engine's namespace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Any ordered collection (list or tuple)
    List(Vec<EngineValue>),
    /// A value with no mapping, described by its foreign type name
    Other(String),
}

impl EngineValue {
    /// Short description of the value's shape, used in protocol errors
    #[must_use]
    pub fn kind(&self) -> String {
        match self {
            Self::None => "none".into(),
            Self::Bool(_) => "bool".into(),
            Self::Int(_) => "int".into(),
            Self::Float(_) => "float".into(),
            Self::Str(_) => "string".into(),
            Self::List(items) => format!("sequence of {}", items.len()),
            Self::Other(type_name) => type_name.clone(),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for EngineValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for EngineValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl<T: Into<Self>> From<Vec<T>> for EngineValue {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

/// One interpreter instance with a persistent global namespace
pub trait Engine {
    /// Execute a statement in the global namespace
    fn eval(&mut self, statement: &str) -> Result<(), EngineError>;

    /// Bind a string to a global name
    fn set(&mut self, name: &str, value: &str) -> Result<(), EngineError>;

    /// Read the value bound to a global name
    fn get_value(&mut self, name: &str) -> Result<EngineValue, EngineError>;

    /// Remove a global name
    fn unbind(&mut self, name: &str) -> Result<(), EngineError> {
        self.eval(&format!("del {name}"))
    }

    /// Release the interpreter. Called exactly once, on the owning thread.
    fn close(&mut self) -> Result<(), EngineError>;
}

/// Creates engine handles; shared by every thread of a registry
pub trait EngineFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn Engine>, EngineError>;
}

impl<F> EngineFactory for F
where
    F: Fn() -> Result<Box<dyn Engine>, EngineError> + Send + Sync,
{
    fn create(&self) -> Result<Box<dyn Engine>, EngineError> {
        self()
    }
}
