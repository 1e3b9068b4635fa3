//! Unit tests for inbound payload content extraction.

use agent_conduit::relay::extract_content;

#[test]
fn message_type_yields_content_field() {
    let raw = r#"{"type":"message","content":"hello worker"}"#;
    assert_eq!(extract_content(raw), "hello worker");
}

#[test]
fn user_message_type_yields_content_field() {
    let raw = r#"{"type":"user_message","content":"from the ui"}"#;
    assert_eq!(extract_content(raw), "from the ui");
}

#[test]
fn message_without_content_yields_empty_string() {
    assert_eq!(extract_content(r#"{"type":"message"}"#), "");
}

#[test]
fn message_with_null_content_yields_empty_string() {
    assert_eq!(extract_content(r#"{"type":"message","content":null}"#), "");
}

#[test]
fn unknown_type_is_forwarded_verbatim() {
    let raw = r#"{"type":"ping","content":"ignored"}"#;
    assert_eq!(extract_content(raw), raw);
}

#[test]
fn json_without_type_is_forwarded_verbatim() {
    let raw = r#"{"content":"no discriminator"}"#;
    assert_eq!(extract_content(raw), raw);
}

#[test]
fn plain_text_is_forwarded_verbatim() {
    assert_eq!(extract_content("just some words"), "just some words");
}

#[test]
fn malformed_json_is_forwarded_verbatim() {
    let raw = r#"{"type":"message","content":"unclosed"#;
    assert_eq!(extract_content(raw), raw);
}
