// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeDelta;
use yare::parameterized;

#[test]
fn token_hash_is_hex_sha256() {
    // SHA-256("secret") -- well-known vector
    assert_eq!(
        token_hash("secret"),
        "2bb80d537b1da3e38bd30361aa855686bde0eacd7162fef6a25fe97bf527a25b"
    );
}

#[test]
fn hashes_match_equal_inputs() {
    let h = token_hash("tok");
    assert!(hashes_match(&h, &h.clone()));
}

#[parameterized(
    different = { "aaaa", "aaab" },
    shorter = { "aaaa", "aaa" },
    empty_vs_nonempty = { "", "a" },
)]
fn hashes_match_rejects(a: &str, b: &str) {
    assert!(!hashes_match(a, b));
}

#[test]
fn token_expiry() {
    let now = Utc::now();
    let mut token = AgentToken {
        id: TokenId::generate(),
        server_id: ServerId::from_string("srv-1"),
        token_hash: token_hash("t"),
        expires_at: None,
        last_used_at: None,
    };
    assert!(!token.is_expired(now));

    token.expires_at = Some(now + TimeDelta::seconds(60));
    assert!(!token.is_expired(now));

    token.expires_at = Some(now - TimeDelta::seconds(1));
    assert!(token.is_expired(now));
}

#[test]
fn agent_status_serde_names() {
    assert_eq!(serde_json::to_string(&AgentStatus::Online).unwrap(), "\"online\"");
    assert_eq!(serde_json::to_string(&AgentStatus::Offline).unwrap(), "\"offline\"");
    assert_eq!(AgentStatus::Online.to_string(), "online");
}
