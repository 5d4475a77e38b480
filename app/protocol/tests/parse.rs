//! Command grammar tests.

use protocol::{Command, parse};
use std::time::Duration;

fn parse_header(header: &str) -> Result<Command, protocol::ParseError> {
    parse(header.as_bytes(), None)
}

#[test]
fn adduser() {
    let cmd = parse_header("ADDUSER 42\n").unwrap();
    assert_eq!(cmd, Command::AddUser { user: 42 });
    assert!(!cmd.is_synchronous());
}

#[test]
fn deluser() {
    assert_eq!(
        parse_header("DELUSER 7\n").unwrap(),
        Command::DelUser { user: 7 }
    );
}

#[test]
fn exists_user() {
    let cmd = parse_header("EXISTS 42\n").unwrap();
    assert_eq!(cmd, Command::ExistsUser { user: 42 });
    assert!(cmd.is_synchronous());
}

#[test]
fn exists_token_form() {
    match parse_header("EXISTS gcm:TOKEN-A\n").unwrap() {
        Command::ExistsToken { gateway, token } => {
            assert_eq!(gateway, "gcm");
            assert_eq!(token, "TOKEN-A");
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn exists_token_keeps_colons_in_token() {
    match parse_header("EXISTS gcm:a:b:c\n").unwrap() {
        Command::ExistsToken { gateway, token } => {
            assert_eq!(gateway, "gcm");
            assert_eq!(token, "a:b:c");
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn exists_malformed_argument() {
    let err = parse_header("EXISTS notanumber\n").unwrap_err();
    assert_eq!(err.message, "Malformed request string");
}

#[test]
fn adduser_rejects_non_integer() {
    let err = parse_header("ADDUSER abc\n").unwrap_err();
    assert_eq!(err.message, "Cannot parse abc as an integer");
}

#[test]
fn subscribe_and_unsubscribe() {
    match parse_header("SUBSCRIBE 7 gcm:TOKEN-A\n").unwrap() {
        Command::Subscribe {
            user,
            gateway,
            token,
        } => {
            assert_eq!(user, 7);
            assert_eq!(gateway, "gcm");
            assert_eq!(token, "TOKEN-A");
        }
        other => panic!("unexpected command: {other:?}"),
    }

    match parse_header("UNSUBSCRIBE 7 gcm:TOKEN-A\n").unwrap() {
        Command::Unsubscribe { user, token, .. } => {
            assert_eq!(user, 7);
            assert_eq!(token, "TOKEN-A");
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn subscribe_requires_colon() {
    let err = parse_header("SUBSCRIBE 7 gcm\n").unwrap_err();
    assert_eq!(err.message, "Malformed request string");
}

#[test]
fn subscribed_bare_gateway() {
    match parse_header("SUBSCRIBED 7 gcm\n").unwrap() {
        Command::Subscribed {
            user,
            gateway,
            token,
        } => {
            assert_eq!(user, 7);
            assert_eq!(gateway, "gcm");
            assert_eq!(token, None);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn subscribed_with_token() {
    match parse_header("SUBSCRIBED 7 gcm:TOKEN-B\n").unwrap() {
        Command::Subscribed { token, .. } => {
            assert_eq!(token.as_deref(), Some("TOKEN-B"));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn wrong_arity_is_rejected() {
    let err = parse_header("SUBSCRIBED 7\n").unwrap_err();
    assert_eq!(err.message, "Wrong number of arguments for SUBSCRIBED: 2");

    let err = parse_header("ADDUSER 1 2\n").unwrap_err();
    assert_eq!(err.message, "Wrong number of arguments for ADDUSER: 3");
}

#[test]
fn unknown_command() {
    let err = parse_header("FROBNICATE 1\n").unwrap_err();
    assert_eq!(err.message, "Unknown request FROBNICATE");
}

#[test]
fn empty_header() {
    let err = parse_header("\n").unwrap_err();
    assert_eq!(err.message, "Header too short");
}

#[test]
fn halt_without_delay() {
    assert_eq!(
        parse_header("HALT\n").unwrap(),
        Command::Halt {
            delay: Duration::ZERO
        }
    );
}

#[test]
fn halt_with_delay() {
    assert_eq!(
        parse_header("HALT 5\n").unwrap(),
        Command::Halt {
            delay: Duration::from_secs(5)
        }
    );
}

#[test]
fn halt_negative_delay_is_immediate() {
    assert_eq!(
        parse_header("HALT -3\n").unwrap(),
        Command::Halt {
            delay: Duration::ZERO
        }
    );
}

#[test]
fn halt_rejects_extra_arguments() {
    let err = parse_header("HALT 1 2\n").unwrap_err();
    assert_eq!(err.message, "Too many arguments for HALT: 3");
}

#[test]
fn halt_rejects_non_integer_delay() {
    let err = parse_header("HALT soon\n").unwrap_err();
    assert_eq!(err.message, "Cannot parse soon as an integer");
}

#[test]
fn push_with_body() {
    match parse(b"PUSH 7\n", Some(b"{\"a\":\"b\"}\n")).unwrap() {
        Command::Push { user, message } => {
            assert_eq!(user, 7);
            assert_eq!(message.0.get("a").map(String::as_str), Some("b"));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn push_null_body_is_empty_message() {
    match parse(b"PUSH 7\n", Some(b"null\n")).unwrap() {
        Command::Push { message, .. } => assert!(message.is_empty()),
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn push_absent_body_is_empty_message() {
    match parse(b"PUSH 7\n", None).unwrap() {
        Command::Push { message, .. } => assert!(message.is_empty()),
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn push_oversized_data_is_rejected() {
    let body = format!(r#"{{"blob":"{}"}}"#, "x".repeat(4096));
    let err = parse(b"PUSH 7\n", Some(body.as_bytes())).unwrap_err();
    assert_eq!(err.message, "Message data exceeds 4096 bytes");
}

#[test]
fn push_malformed_body_is_rejected() {
    let err = parse(b"PUSH 7\n", Some(b"{not json}\n")).unwrap_err();
    assert_eq!(err.message, "Malformed json for PUSH request");

    // An empty body line is present but not JSON.
    let err = parse(b"PUSH 7\n", Some(b"\n")).unwrap_err();
    assert_eq!(err.message, "Malformed json for PUSH request");
}

#[test]
fn commands_are_case_sensitive() {
    let err = parse_header("adduser 42\n").unwrap_err();
    assert_eq!(err.message, "Unknown request adduser");
}

#[test]
fn header_fields_split_on_any_whitespace() {
    assert_eq!(
        parse_header("ADDUSER \t  42 \n").unwrap(),
        Command::AddUser { user: 42 }
    );
}

#[test]
fn negative_user_ids_parse() {
    // The store's ID > -1 check rejects them later; the grammar accepts
    // any signed 64-bit integer.
    assert_eq!(
        parse_header("ADDUSER -1\n").unwrap(),
        Command::AddUser { user: -1 }
    );
}
