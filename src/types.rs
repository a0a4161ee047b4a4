//! Core types for segregated email content

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a single line, as emitted by the engine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum LineMarker {
    /// Blank line (`e`)
    Empty,
    /// Line starting with a quotation marker such as `>` (`m`)
    QuoteMarker,
    /// First line of an embedded message (`s`)
    MessageStart,
    /// Line with content (`t`)
    TextContent,
}

impl LineMarker {
    #[must_use]
    pub const fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            'e' => Some(Self::Empty),
            'm' => Some(Self::QuoteMarker),
            's' => Some(Self::MessageStart),
            't' => Some(Self::TextContent),
            _ => None,
        }
    }

    #[must_use]
    pub const fn symbol(self) -> char {
        match self {
            Self::Empty => 'e',
            Self::QuoteMarker => 'm',
            Self::MessageStart => 's',
            Self::TextContent => 't',
        }
    }
}

/// One marker per line of the classified text, in line order
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MarkerString(Vec<LineMarker>);

impl MarkerString {
    /// Parse the engine's symbol string.
    ///
    /// Returns the position and symbol of the first character outside
    /// `{e, m, s, t}` on failure.
    pub fn parse(symbols: &str) -> std::result::Result<Self, (usize, char)> {
        symbols
            .chars()
            .enumerate()
            .map(|(i, c)| LineMarker::from_symbol(c).ok_or((i, c)))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(Self)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[LineMarker] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = LineMarker> + '_ {
        self.0.iter().copied()
    }
}

impl From<Vec<LineMarker>> for MarkerString {
    fn from(markers: Vec<LineMarker>) -> Self {
        Self(markers)
    }
}

impl fmt::Display for MarkerString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|m| write!(f, "{}", m.symbol()))
    }
}

/// A message body with its trailing signature block removed
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmailStructure {
    /// Message text without the signature
    pub body: String,

    /// Signature block, empty when none was found
    pub signature: String,
}

impl EmailStructure {
    pub fn new(body: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            signature: signature.into(),
        }
    }

    #[must_use]
    pub fn has_signature(&self) -> bool {
        !self.signature.trim().is_empty()
    }
}

/// How the engine should locate the signature
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SignatureStrategy {
    /// Fast line-based heuristic
    #[default]
    Heuristic,

    /// Slower classifier that also looks at who sent the message
    MachineLearning { sender: String },
}

/// Everything extracted from one raw message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegregatedMessage {
    /// Sender address from the `From` header
    pub sender: Option<String>,

    /// Line indices where embedded messages start
    pub boundaries: Vec<usize>,

    /// The chain cut at each boundary
    pub messages: Vec<String>,

    /// Body and signature of the newest message in the chain
    pub structure: EmailStructure,

    pub processed_at: DateTime<Utc>,
}
