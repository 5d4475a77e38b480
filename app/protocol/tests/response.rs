//! Response serialization tests.

use protocol::{Response, Status};

#[tokio::test]
async fn accepted_literal() {
    let mut buf = Vec::new();
    Response::accepted().write_to(&mut buf).await.unwrap();
    assert_eq!(buf, b"ACCEPTED Request accepted.\n");
}

#[tokio::test]
async fn yes_and_no_literals() {
    let mut buf = Vec::new();
    Response::yes().write_to(&mut buf).await.unwrap();
    assert_eq!(buf, b"YES Exists\n");

    buf.clear();
    Response::no().write_to(&mut buf).await.unwrap();
    assert_eq!(buf, b"NO Not existent\n");
}

#[tokio::test]
async fn rejected_carries_message() {
    let mut buf = Vec::new();
    Response::rejected("Unknown request FOO")
        .write_to(&mut buf)
        .await
        .unwrap();
    assert_eq!(buf, b"REJECTED Unknown request FOO\n");
}

#[test]
fn status_words() {
    assert_eq!(Status::Accepted.as_str(), "ACCEPTED");
    assert_eq!(Status::Rejected.as_str(), "REJECTED");
    assert_eq!(Status::Yes.as_str(), "YES");
    assert_eq!(Status::No.as_str(), "NO");
}

#[test]
fn display_matches_wire_form() {
    let resp = Response::new(Status::Yes, "Exists");
    assert_eq!(resp.to_string(), "YES Exists");
}
