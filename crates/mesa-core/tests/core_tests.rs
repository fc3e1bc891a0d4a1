//! Tests for mesa-core: types, errors

use mesa_core::*;

// ===========================================================================
// SessionKey
// ===========================================================================

#[test]
fn session_key_new_and_display() {
    let key = SessionKey::new("Mars Facts Assistant");
    assert_eq!(key.as_str(), "Mars Facts Assistant");
    assert_eq!(format!("{}", key), "Mars Facts Assistant");
}

#[test]
fn session_key_equality_and_hash() {
    use std::collections::HashSet;
    let a = SessionKey::new("same");
    let b: SessionKey = "same".into();
    let c: SessionKey = String::from("different").into();
    assert_eq!(a, b);
    assert_ne!(a, c);
    let mut set = HashSet::new();
    set.insert(a);
    set.insert(b);
    set.insert(c);
    assert_eq!(set.len(), 2);
}

// ===========================================================================
// Secret
// ===========================================================================

#[test]
fn secret_is_redacted() {
    let s = Secret::new("abc123");
    assert_eq!(s.expose(), "abc123");
    assert_eq!(format!("{}", s), "***");
    assert!(!format!("{:?}", s).contains("abc123"));
}

// ===========================================================================
// Error
// ===========================================================================

#[test]
fn error_remote_service() {
    let e = Error::remote_service("insight_weather", 503, "unavailable");
    let msg = e.to_string();
    assert!(msg.contains("insight_weather"));
    assert!(msg.contains("503"));
    assert!(matches!(e, Error::RemoteService { status: 503, .. }));
}

#[test]
fn error_invalid_state() {
    let e = Error::invalid_state("invoke", "unconnected");
    assert!(e.is_invalid_state());
    assert_eq!(e.to_string(), "invalid state: cannot invoke while unconnected");
}

#[test]
fn error_tool_invocation() {
    let e = Error::tool_invocation("web_search_exa", "timeout");
    assert!(e.to_string().contains("web_search_exa"));
    assert!(e.to_string().contains("timeout"));
    assert!(!e.is_invalid_state());
}

#[test]
fn error_from_io() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let e: Error = io_err.into();
    assert!(matches!(e, Error::Io(_)));
}

#[test]
fn error_from_json() {
    let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
    let e: Error = json_err.into();
    assert!(matches!(e, Error::Json(_)));
}

#[test]
fn error_display_all_variants() {
    let errors: Vec<Error> = vec![
        Error::remote_service("s", 500, "b"),
        Error::Connection("x".into()),
        Error::tool_invocation("n", "m"),
        Error::invalid_state("o", "s"),
        Error::runner("x"),
        Error::Config("x".into()),
        Error::Internal("x".into()),
    ];
    for e in errors {
        assert!(!format!("{}", e).is_empty());
    }
}

// ===========================================================================
// Persona
// ===========================================================================

#[test]
fn persona_parses_case_insensitively() {
    assert_eq!("WEATHER".parse::<Persona>().unwrap(), Persona::Weather);
    assert_eq!(" assistant ".parse::<Persona>().unwrap(), Persona::Assistant);
    assert!("nope".parse::<Persona>().is_err());
}
