// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn decode_rejects_unknown_type() {
    let err = decode_inbound(r#"{"type": "telemetry:v2", "data": {}}"#);
    assert!(matches!(err, Err(ProtocolError::Invalid(_))));
}

#[test]
fn decode_rejects_missing_fields() {
    // command:ack without a commandId
    let err = decode_inbound(r#"{"type": "command:ack"}"#);
    assert!(matches!(err, Err(ProtocolError::Invalid(_))));
}

#[test]
fn decode_rejects_non_json() {
    assert!(decode_inbound("pong").is_err());
    assert!(decode_inbound("").is_err());
}

#[test]
fn decode_rejects_oversized_frame() {
    let mut frame = String::from(r#"{"type": "pong", "pad": ""#);
    frame.push_str(&"x".repeat(MAX_FRAME_BYTES));
    frame.push_str("\"}");
    assert!(matches!(decode_inbound(&frame), Err(ProtocolError::FrameTooLarge(_))));
}

#[test]
fn encode_produces_parseable_json() {
    let frame = encode(&crate::Outbound::RequestStatus).unwrap();
    let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(value["type"], "request_status");
}
