// Enforce at crate level
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]
#![allow(clippy::significant_drop_tightening)]

//! Email Segregation
//!
//! Separates an email chain into its constituent messages and a message body
//! from its trailing signature. The line classification itself is done by an
//! external, non-thread-safe engine; this crate owns running that engine
//! safely from many threads.
//!
//! # Features
//!
//! - One engine handle per calling thread, created lazily and closed when the
//!   thread releases it or exits
//! - Every engine call binds its inputs, invokes, reads the result and
//!   unbinds again, so no state leaks into the next call
//! - Distinct errors for initialization failures, malformed engine results
//!   and engine exceptions
//! - A worker pool with per-call timeouts
//! - An embedded Python engine behind the `python` feature
//!
//! # Example
//!
//! ```rust,ignore
//! use email_segregation::{ContentSegregation, EngineConfig, PythonEngineFactory};
//!
//! let config = EngineConfig::default();
//! let factory = PythonEngineFactory::new(config.search_paths.clone());
//! let segregation = ContentSegregation::new(factory, config)?;
//!
//! let starts = segregation.split_email(chain)?;
//! let structure = segregation.extract_signature("Wow. Awesome!\n--\nBob Smith")?;
//! println!("{} / {}", structure.body, structure.signature);
//! ```

mod config;
mod decode;
mod engine;
mod error;
mod mime;
mod pool;
#[cfg(feature = "python")]
mod python;
mod registry;
mod segregation;
mod session;
mod types;

pub use config::EngineConfig;
pub use decode::{decode_boundaries, parse_markers, split_messages, split_signature};
pub use engine::{Engine, EngineFactory, EngineValue};
pub use error::{EngineError, Result, SegregationError};
pub use mime::{RawMessage, parse_raw_message};
pub use pool::SegregationPool;
#[cfg(feature = "python")]
pub use python::{PythonEngine, PythonEngineFactory};
pub use registry::{HandleInfo, HandleRegistry};
pub use segregation::ContentSegregation;
pub use session::{CallSession, Operation, RESULT_VAR, SENDER_VAR, TEXT_VAR, invoke};
pub use types::*;
