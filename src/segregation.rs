//! Public operations over the calling thread's engine handle

use crate::config::EngineConfig;
use crate::decode::{decode_boundaries, parse_markers, split_messages, split_signature};
use crate::engine::EngineFactory;
use crate::error::{Result, SegregationError};
use crate::mime::parse_raw_message;
use crate::registry::HandleRegistry;
use crate::session::{Operation, invoke};
use crate::types::{EmailStructure, SegregatedMessage, SignatureStrategy};
use chrono::Utc;
use tracing::{debug, warn};

/// Splits email chains and extracts signatures.
///
/// Safe to share between threads: every thread gets its own engine handle
/// from the registry, created on first use.
#[derive(Debug)]
pub struct ContentSegregation {
    registry: HandleRegistry,
    config: EngineConfig,
}

impl ContentSegregation {
    pub fn new(factory: impl EngineFactory + 'static, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            registry: HandleRegistry::new(factory),
            config,
        })
    }

    #[must_use]
    pub const fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Line indices at which each embedded message of the chain starts.
    ///
    /// When this thread's handle previously failed to initialize, no
    /// boundaries are reported instead of an error.
    pub fn split_email(&self, message: &str) -> Result<Vec<usize>> {
        let operation = Operation::SplitEmail { text: message };
        self.registry.with_handle(|engine| {
            let Some(engine) = engine else {
                warn!("No engine handle on this thread, reporting no message boundaries");
                return Ok(Vec::new());
            };

            let raw = invoke(engine, &self.config, &operation)?;
            let markers = parse_markers(operation.label(), raw)?;

            let lines = message.split('\n').count();
            if markers.len() != lines {
                warn!(
                    "Engine returned {} markers for {lines} lines",
                    markers.len()
                );
            }

            let boundaries = decode_boundaries(&markers);
            debug!("Found {} message boundaries", boundaries.len());
            Ok(boundaries)
        })
    }

    /// Separate the trailing signature using the fast heuristic
    pub fn extract_signature(&self, message: &str) -> Result<EmailStructure> {
        self.extract(Operation::ExtractSignature { text: message })
    }

    /// Separate the trailing signature using the slower classifier that
    /// also considers the sender
    pub fn extract_signature_machine_learning(
        &self,
        message: &str,
        sender: &str,
    ) -> Result<EmailStructure> {
        self.extract(Operation::ExtractSignatureMachineLearning {
            text: message,
            sender,
        })
    }

    pub fn extract_signature_with(
        &self,
        message: &str,
        strategy: &SignatureStrategy,
    ) -> Result<EmailStructure> {
        match strategy {
            SignatureStrategy::Heuristic => self.extract_signature(message),
            SignatureStrategy::MachineLearning { sender } => {
                self.extract_signature_machine_learning(message, sender)
            }
        }
    }

    fn extract(&self, operation: Operation<'_>) -> Result<EmailStructure> {
        self.registry.with_handle(|engine| {
            let engine = engine.ok_or_else(|| {
                SegregationError::Initialization(format!(
                    "no engine handle on this thread for {}",
                    operation.label()
                ))
            })?;
            let raw = invoke(engine, &self.config, &operation)?;
            split_signature(operation.label(), raw)
        })
    }

    /// Parse a raw RFC 5322 message, split its chain and extract the
    /// signature of the newest message.
    ///
    /// With `machine_learning` set, the sender from the `From` header is
    /// passed to the slower strategy; without a sender the heuristic is used.
    pub fn segregate(&self, raw: &[u8], machine_learning: bool) -> Result<SegregatedMessage> {
        let message = parse_raw_message(raw)?;
        let boundaries = self.split_email(&message.text)?;
        let messages = split_messages(&message.text, &boundaries);
        let newest = messages.first().map_or(message.text.as_str(), String::as_str);

        let strategy = match (&message.sender, machine_learning) {
            (Some(sender), true) => SignatureStrategy::MachineLearning {
                sender: sender.clone(),
            },
            (None, true) => {
                debug!("Message has no sender, using heuristic signature extraction");
                SignatureStrategy::Heuristic
            }
            (_, false) => SignatureStrategy::Heuristic,
        };
        let structure = self.extract_signature_with(newest, &strategy)?;

        Ok(SegregatedMessage {
            sender: message.sender,
            boundaries,
            messages,
            structure,
            processed_at: Utc::now(),
        })
    }
}
