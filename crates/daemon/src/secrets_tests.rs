// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn credentials() -> MountCredentials {
    MountCredentials {
        username: "media".to_string(),
        password: "hunter2".to_string(),
        domain: Some("WORKGROUP".to_string()),
    }
}

#[test]
fn round_trip() {
    let secrets = SecretsBox::new(&[1u8; 32]);
    let blob = secrets.encrypt(&credentials()).unwrap();
    let decrypted = secrets.decrypt(&blob).unwrap();
    assert_eq!(decrypted.username, "media");
    assert_eq!(decrypted.password, "hunter2");
    assert_eq!(decrypted.domain.as_deref(), Some("WORKGROUP"));
}

#[test]
fn nonce_makes_ciphertexts_differ() {
    let secrets = SecretsBox::new(&[1u8; 32]);
    let a = secrets.encrypt(&credentials()).unwrap();
    let b = secrets.encrypt(&credentials()).unwrap();
    assert_ne!(a, b);
}

#[test]
fn wrong_key_fails_closed() {
    let blob = SecretsBox::new(&[1u8; 32]).encrypt(&credentials()).unwrap();
    let err = SecretsBox::new(&[2u8; 32]).decrypt(&blob).unwrap_err();
    assert!(matches!(err, SecretsError::Decrypt));
}

#[test]
fn tampered_ciphertext_fails_closed() {
    let secrets = SecretsBox::new(&[1u8; 32]);
    let mut blob = secrets.encrypt(&credentials()).unwrap();
    let last = blob.len() - 1;
    blob[last] ^= 0x01;
    assert!(matches!(secrets.decrypt(&blob), Err(SecretsError::Decrypt)));
}

#[test]
fn truncated_blob_is_rejected() {
    let secrets = SecretsBox::new(&[1u8; 32]);
    assert!(matches!(secrets.decrypt(&[0u8; 4]), Err(SecretsError::Truncated)));
}

#[test]
fn from_hex_validates_key() {
    assert!(SecretsBox::from_hex(&"ab".repeat(32)).is_ok());
    assert!(matches!(SecretsBox::from_hex("abcd"), Err(SecretsError::BadKey)));
    assert!(matches!(SecretsBox::from_hex(&"zz".repeat(32)), Err(SecretsError::BadKey)));
}

#[test]
fn debug_never_prints_password() {
    let debug = format!("{:?}", credentials());
    assert!(!debug.contains("hunter2"));
    assert!(debug.contains("redacted"));
}
