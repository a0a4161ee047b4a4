mod common;

use common::{ScriptedFactory, Step, line_classifier};
use email_segregation::*;

const CHAIN: &[u8] = b"From: Bob Smith <bob@example.com>\r\n\
    To: ann@example.com\r\n\
    Subject: Re: Plugin\r\n\
    \r\n\
    Works for me.\r\n\
    --\r\n\
    Bob Smith\r\n\
    \r\n\
    From: Ann <ann@example.com>\r\n\
    > Does it work?\r\n";

#[test]
fn test_parse_plain_message() {
    let message = parse_raw_message(CHAIN).unwrap();

    assert_eq!(message.sender.as_deref(), Some("bob@example.com"));
    assert!(message.text.starts_with("Works for me.\n--\nBob Smith"));
    assert!(!message.text.contains('\r'));
}

#[test]
fn test_parse_prefers_plain_part() {
    let raw = b"From: a@example.com\r\n\
        Content-Type: multipart/alternative; boundary=\"b\"\r\n\
        \r\n\
        --b\r\n\
        Content-Type: text/html\r\n\
        \r\n\
        <p>Html</p>\r\n\
        --b\r\n\
        Content-Type: text/plain\r\n\
        \r\n\
        Plain\r\n\
        --b--\r\n";

    let message = parse_raw_message(raw).unwrap();

    assert_eq!(message.text.trim(), "Plain");
}

#[test]
fn test_parse_html_only() {
    let raw = b"From: a@example.com\r\n\
        Content-Type: text/html\r\n\
        \r\n\
        <html><body><p>Hello</p><p>World</p></body></html>";

    let message = parse_raw_message(raw).unwrap();

    assert_eq!(message.text, "Hello\nWorld");
}

#[test]
fn test_segregate_chain() {
    let (factory, _) = ScriptedFactory::new(line_classifier);
    let segregation = ContentSegregation::new(factory, EngineConfig::default()).unwrap();

    let result = segregation.segregate(CHAIN, false).unwrap();

    assert_eq!(result.boundaries, vec![4]);
    assert_eq!(result.messages.len(), 2);
    assert!(result.messages[1].starts_with("From: Ann"));
    assert_eq!(result.structure.body, "Works for me.");
    assert_eq!(result.structure.signature, "--\nBob Smith\n");
}

#[test]
fn test_segregate_uses_sender_for_machine_learning() {
    let (factory, shared) = ScriptedFactory::new(line_classifier);
    let segregation = ContentSegregation::new(factory, EngineConfig::default()).unwrap();

    segregation.segregate(CHAIN, true).unwrap();

    assert!(shared.steps().contains(&Step::Set(SENDER_VAR.into())));
}

#[test]
fn test_segregate_without_sender_falls_back() {
    let (factory, shared) = ScriptedFactory::new(line_classifier);
    let segregation = ContentSegregation::new(factory, EngineConfig::default()).unwrap();

    segregation
        .segregate(b"Subject: hi\r\n\r\nJust text", true)
        .unwrap();

    assert!(!shared.steps().contains(&Step::Set(SENDER_VAR.into())));
}
