//! End-to-end handshake scenarios between two devices.

use courier_crypto::{
    CryptoError, Device, Envelope, PrekeyBundle, SeededEnv, accept_session, init_session,
};

#[test]
fn three_prekey_bundle_hello_scenario() {
    let env = SeededEnv::new(2024);
    let mut device_a = Device::generate(&env).unwrap();
    let device_b = Device::generate(&env).unwrap();

    assert_eq!(device_a.next_one_time_prekey_id(), 0);
    let published = device_a.publish_prekey_bundle(3, &env).unwrap();
    assert_eq!(device_a.next_one_time_prekey_id(), 3);

    // Key service hands out the bundle with a single one-time prekey
    let fetched = PrekeyBundle::from_bytes(&published.for_handshake(Some(0)).unwrap().to_bytes())
        .unwrap();

    let (mut session_b, handshake) = init_session(&device_b, &fetched, &env).unwrap();
    assert_eq!(handshake.one_time_prekey_id, Some(0));

    let envelope = session_b.encrypt(b"hello", &env).unwrap();
    let delivered = Envelope::from_bytes(&envelope.to_bytes()).unwrap();
    let carried = delivered.header.handshake.clone().unwrap();
    assert_eq!(carried, handshake);

    let mut session_a = accept_session(&mut device_a, &carried).unwrap();
    assert_eq!(session_a.decrypt(&delivered).unwrap(), b"hello");

    assert!(!device_a.has_one_time_prekey(0));
    assert_eq!(device_a.one_time_prekey_ids(), vec![1, 2]);
    assert!(matches!(
        accept_session(&mut device_a, &carried),
        Err(CryptoError::UnknownPrekey { kind: "one-time", id: 0 })
    ));

    let reply = session_a.encrypt(b"hello back", &env).unwrap();
    assert!(reply.header.handshake.is_none());
    assert_eq!(session_b.decrypt(&reply).unwrap(), b"hello back");
}

#[test]
fn exhausted_one_time_prekeys_still_handshake() {
    let env = SeededEnv::new(7);
    let mut responder = Device::generate(&env).unwrap();
    let initiator = Device::generate(&env).unwrap();

    let bundle = responder.publish_prekey_bundle(2, &env).unwrap().for_handshake(None).unwrap();
    let (mut outbound, handshake) = init_session(&initiator, &bundle, &env).unwrap();
    assert_eq!(handshake.one_time_prekey_id, None);

    let mut inbound = accept_session(&mut responder, &handshake).unwrap();
    assert_eq!(responder.one_time_prekey_ids(), vec![0, 1]);

    let envelope = outbound.encrypt(b"no one-time key", &env).unwrap();
    assert_eq!(inbound.decrypt(&envelope).unwrap(), b"no one-time key");
}

#[test]
fn tampered_signature_is_rejected_without_session() {
    let env = SeededEnv::new(8);
    let mut responder = Device::generate(&env).unwrap();
    let initiator = Device::generate(&env).unwrap();

    let mut bundle = responder.publish_prekey_bundle(1, &env).unwrap();
    let last = bundle.signed_prekey_signature.len() - 1;
    bundle.signed_prekey_signature[last] ^= 0x01;

    let result = init_session(&initiator, &bundle, &env);
    assert!(matches!(result, Err(CryptoError::InvalidSignature)));
    assert!(result.unwrap_err().is_fatal());
}

#[test]
fn bundle_from_other_identity_is_rejected() {
    let env = SeededEnv::new(9);
    let mut responder = Device::generate(&env).unwrap();
    let impostor = Device::generate(&env).unwrap();
    let initiator = Device::generate(&env).unwrap();

    let mut bundle = responder.publish_prekey_bundle(1, &env).unwrap();
    bundle.identity = impostor.identity_public();

    assert!(matches!(init_session(&initiator, &bundle, &env), Err(CryptoError::InvalidSignature)));
}

#[test]
fn sessions_bind_both_identities() {
    let env = SeededEnv::new(10);
    let mut bob = Device::generate(&env).unwrap();
    let alice = Device::generate(&env).unwrap();
    let carol = Device::generate(&env).unwrap();
    let bundle = bob.publish_prekey_bundle(2, &env).unwrap();

    let (mut from_alice, handshake) = init_session(&alice, &bundle, &env).unwrap();
    let mut at_bob = accept_session(&mut bob, &handshake).unwrap();
    assert_eq!(at_bob.remote_identity(), &alice.identity_public());
    assert_eq!(from_alice.remote_identity(), &bob.identity_public());

    // Carol claims Alice's handshake under her own identity
    let mut forged = handshake.clone();
    forged.identity = carol.identity_public();
    forged.one_time_prekey_id = Some(1);
    let mut forged_session = accept_session(&mut bob, &forged).unwrap();

    let envelope = from_alice.encrypt(b"for bob only", &env).unwrap();
    assert!(forged_session.decrypt(&envelope).is_err());
    assert_eq!(at_bob.decrypt(&envelope).unwrap(), b"for bob only");
}

#[test]
fn device_restored_mid_handshake_accepts() {
    let env = SeededEnv::new(11);
    let mut bob = Device::generate(&env).unwrap();
    let alice = Device::generate(&env).unwrap();
    let bundle = bob.publish_prekey_bundle(4, &env).unwrap();

    let mut bob = Device::import(&bob.export()).unwrap();

    let (mut outbound, handshake) = init_session(&alice, &bundle, &env).unwrap();
    let mut inbound = accept_session(&mut bob, &handshake).unwrap();

    let envelope = outbound.encrypt(b"after restart", &env).unwrap();
    assert_eq!(inbound.decrypt(&envelope).unwrap(), b"after restart");
}
