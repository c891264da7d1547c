#![cfg(feature = "softtoken")]
use std::thread;
use std::time::Duration;

use authn_bridge::attestation::{AttestationObject, AuthenticatorData};
use authn_bridge::crypto::compute_sha256;
use authn_bridge::options::{AttestationConveyance, UserVerification};
use authn_bridge::prelude::*;
use authn_bridge::softtoken::SoftToken;

const RP_ID: &str = "example.com";

fn register_request(client_data: &[u8]) -> RegisterRequest {
    RegisterRequest {
        client_data: client_data.to_vec(),
        rp_id: RP_ID.to_string(),
        user_name: "alice".to_string(),
        display_name: String::new(),
        exclude_credentials: vec![],
        timeout_ms: 30_000,
    }
}

fn authenticate_request(client_data: &[u8], allow: &[u8]) -> AuthenticateRequest {
    AuthenticateRequest {
        client_data: client_data.to_vec(),
        rp_id: RP_ID.to_string(),
        allow_credentials: vec![KeyHandle::new(allow)],
        timeout_ms: 30_000,
    }
}

#[test]
fn register_then_authenticate() {
    let _ = tracing_subscriber::fmt::try_init();
    let mut bridge = Bridge::new(SoftToken::new().unwrap());
    let cancel = CancellationToken::new();

    let r = bridge
        .register(UiContext::None, &register_request(b"H1"), &cancel)
        .unwrap();
    let ao = AttestationObject::try_from(r.attestation_object.as_slice()).unwrap();
    assert_eq!(ao.fmt, "packed");
    assert_eq!(ao.auth_data.rp_id_hash, compute_sha256(RP_ID.as_bytes()));
    let cred_id = ao.credential_id().unwrap().to_vec();
    assert_eq!(cred_id, r.credential_id);
    let key = ao.public_key().unwrap().clone();

    let a = bridge
        .authenticate(UiContext::None, &authenticate_request(b"H2", &cred_id), &cancel)
        .unwrap();
    assert_eq!(a.credential_id, cred_id);
    assert!(key
        .verify_assertion(&a.authenticator_data, &compute_sha256(b"H2"), &a.signature)
        .unwrap());

    let ad = AuthenticatorData::try_from(a.authenticator_data.as_slice()).unwrap();
    assert_eq!(ad.rp_id_hash, compute_sha256(RP_ID.as_bytes()));
    assert!(ad.user_present());
    assert_eq!(ad.counter, 1);
}

#[test]
fn exclude_list_prevents_reregistration() {
    let mut bridge = Bridge::new(SoftToken::new().unwrap());
    let cancel = CancellationToken::new();

    let r = bridge
        .register(UiContext::None, &register_request(b"H1"), &cancel)
        .unwrap();

    let mut req = register_request(b"H1");
    req.exclude_credentials = vec![
        KeyHandle::new(vec![0xff; 8]),
        KeyHandle::new(r.credential_id.clone()),
    ];
    assert_eq!(
        bridge.register(UiContext::None, &req, &cancel),
        Err(BridgeError::CredentialExcluded)
    );

    // Unknown excluded credentials don't matter.
    req.exclude_credentials = vec![KeyHandle::new(vec![0xff; 8])];
    assert!(bridge.register(UiContext::None, &req, &cancel).is_ok());
    assert_eq!(bridge.backend().credential_count(), 2);
}

#[test]
fn unknown_credential_fails_authentication() {
    let mut bridge = Bridge::new(SoftToken::new().unwrap());
    assert_eq!(
        bridge.authenticate(
            UiContext::None,
            &authenticate_request(b"H2", &[1, 2, 3]),
            &CancellationToken::new()
        ),
        Err(BridgeError::NoMatchingCredential)
    );
}

#[test]
fn options_flow_to_backend() {
    let options = CeremonyOptions::default().attestation(AttestationConveyance::None);
    let mut bridge = Bridge::with_options(SoftToken::new().unwrap(), options);
    let r = bridge
        .register(
            UiContext::None,
            &register_request(b"H1"),
            &CancellationToken::new(),
        )
        .unwrap();
    let ao = AttestationObject::try_from(r.attestation_object.as_slice()).unwrap();
    assert_eq!(ao.fmt, "none");

    let options = CeremonyOptions::default().user_verification(UserVerification::Required);
    let mut bridge = Bridge::with_options(SoftToken::new().unwrap(), options);
    assert_eq!(
        bridge.register(
            UiContext::None,
            &register_request(b"H1"),
            &CancellationToken::new()
        ),
        Err(BridgeError::NotSupported)
    );
}

#[test]
fn cancel_from_another_thread() {
    let _ = tracing_subscriber::fmt::try_init();
    let token = SoftToken::new()
        .unwrap()
        .with_presence_delay(Duration::from_secs(60));
    let mut bridge = Bridge::new(token);
    let cancel = CancellationToken::new();

    let c = cancel.clone();
    let t = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        c.cancel();
    });

    assert_eq!(
        bridge.register(UiContext::None, &register_request(b"H1"), &cancel),
        Err(BridgeError::Cancelled)
    );
    t.join().unwrap();

    // The token stays cancelled.
    assert_eq!(
        bridge.register(UiContext::None, &register_request(b"H1"), &cancel),
        Err(BridgeError::Cancelled)
    );
    assert_eq!(bridge.backend().credential_count(), 0);
}

#[test]
fn timeout_is_clamped_before_reaching_backend() {
    // A 100 ms presence delay beats the requested timeout, but not the
    // clamped one.
    let token = SoftToken::new()
        .unwrap()
        .with_presence_delay(Duration::from_millis(100));
    let mut bridge = Bridge::with_options(token, CeremonyOptions::default().max_timeout_ms(10));

    assert_eq!(
        bridge.register(
            UiContext::None,
            &register_request(b"H1"),
            &CancellationToken::new()
        ),
        Err(BridgeError::Cancelled)
    );
}
