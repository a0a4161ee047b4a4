//! Bind, invoke, read, unbind against one engine handle
//!
//! The engine's global namespace persists for the lifetime of the handle, so
//! every name a session introduces is removed before the session ends,
//! whether the call succeeded, failed or panicked.

use crate::config::EngineConfig;
use crate::engine::{Engine, EngineValue};
use crate::error::{EngineError, Result, SegregationError};
use tracing::{debug, warn};

/// Global name holding the message text during a call
pub const TEXT_VAR: &str = "__segregation_text";

/// Global name holding the sender during a machine learning call
pub const SENDER_VAR: &str = "__segregation_sender";

/// Global name receiving the operation's result
pub const RESULT_VAR: &str = "__segregation_result";

/// A logical operation offered by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation<'a> {
    SplitEmail { text: &'a str },
    ExtractSignature { text: &'a str },
    ExtractSignatureMachineLearning { text: &'a str, sender: &'a str },
}

impl<'a> Operation<'a> {
    /// Stable name used in errors and logs
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::SplitEmail { .. } => "splitEmail",
            Self::ExtractSignature { .. } => "extractSignature",
            Self::ExtractSignatureMachineLearning { .. } => "extractSignatureMachineLearning",
        }
    }

    /// Engine function implementing this operation
    #[must_use]
    pub fn function<'c>(&self, config: &'c EngineConfig) -> &'c str {
        match self {
            Self::SplitEmail { .. } => &config.split_function,
            Self::ExtractSignature { .. } => &config.signature_function,
            Self::ExtractSignatureMachineLearning { .. } => &config.ml_signature_function,
        }
    }

    /// Inputs in argument order
    #[must_use]
    pub fn bindings(&self) -> Vec<(&'static str, &'a str)> {
        match *self {
            Self::SplitEmail { text } | Self::ExtractSignature { text } => vec![(TEXT_VAR, text)],
            Self::ExtractSignatureMachineLearning { text, sender } => {
                vec![(TEXT_VAR, text), (SENDER_VAR, sender)]
            }
        }
    }
}

/// Run `operation` on `engine` and return the raw result.
///
/// Cleanup always runs. If the call itself failed, that error wins and a
/// cleanup failure is only logged; if the call succeeded, a cleanup failure
/// is returned because the handle's namespace is no longer clean.
pub fn invoke(
    engine: &mut dyn Engine,
    config: &EngineConfig,
    operation: &Operation<'_>,
) -> Result<EngineValue> {
    let label = operation.label();
    debug!("Invoking {label}");

    let mut session = CallSession::new(engine, label);
    let outcome = session.run(&config.module, operation.function(config), &operation.bindings());
    let cleanup = session.finish();

    match (outcome, cleanup) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), cleanup) => {
            if let Err(cleanup) = cleanup {
                warn!("Cleanup after failed {label} also failed: {cleanup}");
            }
            Err(e)
        }
    }
}

/// Tracks every name bound during one call so it can be removed again
pub struct CallSession<'h> {
    engine: &'h mut dyn Engine,
    operation: &'static str,
    bound: Vec<&'static str>,
}

impl<'h> CallSession<'h> {
    pub fn new(engine: &'h mut dyn Engine, operation: &'static str) -> Self {
        Self {
            engine,
            operation,
            bound: Vec::new(),
        }
    }

    fn run(
        &mut self,
        module: &str,
        function: &str,
        bindings: &[(&'static str, &str)],
    ) -> Result<EngineValue> {
        self.eval(&format!("import {module}"))?;
        for &(name, value) in bindings {
            self.bind(name, value)?;
        }

        let args = bindings
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(", ");
        self.eval(&format!("{RESULT_VAR} = {module}.{function}({args})"))?;
        self.bound.push(RESULT_VAR);

        self.read(RESULT_VAR)
    }

    /// Bind `value` to the reserved global `name`
    pub fn bind(&mut self, name: &'static str, value: &str) -> Result<()> {
        self.engine
            .set(name, value)
            .map_err(|e| self.invocation_error(e))?;
        self.bound.push(name);
        Ok(())
    }

    pub fn eval(&mut self, statement: &str) -> Result<()> {
        self.engine
            .eval(statement)
            .map_err(|e| self.invocation_error(e))
    }

    pub fn read(&mut self, name: &str) -> Result<EngineValue> {
        self.engine
            .get_value(name)
            .map_err(|e| self.invocation_error(e))
    }

    /// Names currently bound by this session
    #[must_use]
    pub fn bound(&self) -> &[&'static str] {
        &self.bound
    }

    /// Unbind everything and report the first failure
    pub fn finish(mut self) -> Result<()> {
        self.unbind_all()
    }

    fn unbind_all(&mut self) -> Result<()> {
        let mut first = None;
        while let Some(name) = self.bound.pop() {
            if let Err(e) = self.engine.unbind(name) {
                warn!("Failed to unbind {name} after {}: {e}", self.operation);
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), |e| Err(self.invocation_error(e)))
    }

    fn invocation_error(&self, source: EngineError) -> SegregationError {
        SegregationError::Invocation {
            operation: self.operation,
            source,
        }
    }
}

impl Drop for CallSession<'_> {
    fn drop(&mut self) {
        if !self.bound.is_empty() {
            let _ = self.unbind_all();
        }
    }
}
