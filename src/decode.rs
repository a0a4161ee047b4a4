//! Interpretation of raw engine results
//!
//! Everything here is pure: the engine does the classification, these
//! functions only check the shape of what came back and repackage it.

use crate::engine::EngineValue;
use crate::error::{Result, SegregationError};
use crate::types::{EmailStructure, LineMarker, MarkerString};

/// Indices of every [`LineMarker::MessageStart`], in line order.
///
/// Adjacent or duplicate starts are kept as emitted.
#[must_use]
pub fn decode_boundaries(markers: &MarkerString) -> Vec<usize> {
    markers
        .iter()
        .enumerate()
        .filter(|(_, marker)| *marker == LineMarker::MessageStart)
        .map(|(i, _)| i)
        .collect()
}

/// Validate the raw result of a split call as a marker string
pub fn parse_markers(operation: &'static str, raw: EngineValue) -> Result<MarkerString> {
    let EngineValue::Str(symbols) = raw else {
        return Err(SegregationError::ProtocolViolation {
            operation,
            expected: "marker string",
            found: raw.kind(),
        });
    };

    MarkerString::parse(&symbols).map_err(|(position, symbol)| {
        SegregationError::ProtocolViolation {
            operation,
            expected: "markers drawn from e, m, s, t",
            found: format!("{symbol:?} at line {position}"),
        }
    })
}

/// Repackage a `(body, signature)` pair
pub fn split_signature(operation: &'static str, raw: EngineValue) -> Result<EmailStructure> {
    let violation = |found: String| SegregationError::ProtocolViolation {
        operation,
        expected: "sequence of 2 strings",
        found,
    };

    match raw {
        EngineValue::List(items) => match <[EngineValue; 2]>::try_from(items) {
            Ok([EngineValue::Str(body), EngineValue::Str(signature)]) => {
                Ok(EmailStructure { body, signature })
            }
            Ok([body, signature]) => Err(violation(format!(
                "pair of {} and {}",
                body.kind(),
                signature.kind()
            ))),
            Err(items) => Err(violation(EngineValue::List(items).kind())),
        },
        other => Err(violation(other.kind())),
    }
}

/// Cut `text` into messages starting at each boundary line.
///
/// Lines before the first boundary form the first message. Boundaries past
/// the last line and empty segments are ignored.
#[must_use]
pub fn split_messages(text: &str, boundaries: &[usize]) -> Vec<String> {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut cuts: Vec<usize> = boundaries
        .iter()
        .copied()
        .filter(|&b| b < lines.len())
        .collect();
    cuts.sort_unstable();
    cuts.dedup();

    let mut messages = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0;
    for end in cuts.into_iter().chain(std::iter::once(lines.len())) {
        if end > start {
            messages.push(lines[start..end].join("\n"));
        }
        start = end;
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers(s: &str) -> MarkerString {
        MarkerString::parse(s).unwrap()
    }

    #[test]
    fn empty_markers_have_no_boundaries() {
        assert!(decode_boundaries(&markers("")).is_empty());
    }

    #[test]
    fn single_message_has_no_boundaries() {
        assert!(decode_boundaries(&markers("ttt")).is_empty());
    }

    #[test]
    fn every_start_is_reported() {
        assert_eq!(decode_boundaries(&markers("tsettetseeeet")), vec![1, 7]);
    }

    #[test]
    fn adjacent_starts_are_kept() {
        assert_eq!(decode_boundaries(&markers("tsst")), vec![1, 2]);
    }

    #[test]
    fn non_string_split_result_is_violation() {
        let err = parse_markers("splitEmail", EngineValue::List(vec![])).unwrap_err();
        assert!(matches!(err, SegregationError::ProtocolViolation { .. }));
    }

    #[test]
    fn unknown_marker_is_violation() {
        let err = parse_markers("splitEmail", "tex".into()).unwrap_err();
        assert!(err.to_string().contains("'x' at line 2"));
    }

    #[test]
    fn pair_of_non_strings_is_violation() {
        let raw = EngineValue::List(vec![EngineValue::Int(1), "sig".into()]);
        let err = split_signature("extractSignature", raw).unwrap_err();
        assert!(err.to_string().contains("pair of int and string"));
    }

    #[test]
    fn messages_split_at_boundaries() {
        let text = "Hi\n\nFrom: a\nOld\nFrom: b\nOlder";
        assert_eq!(
            split_messages(text, &[2, 4]),
            vec!["Hi\n", "From: a\nOld", "From: b\nOlder"]
        );
    }

    #[test]
    fn leading_and_duplicate_boundaries_yield_no_empty_messages() {
        assert_eq!(split_messages("a\nb", &[0, 1, 1, 9]), vec!["a", "b"]);
    }

    #[test]
    fn no_boundaries_is_one_message() {
        assert_eq!(split_messages("a\nb", &[]), vec!["a\nb"]);
    }
}
