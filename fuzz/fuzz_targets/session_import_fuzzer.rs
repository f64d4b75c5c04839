//! Fuzz target for session state import
//!
//! # Strategy
//!
//! - Raw bytes straight into `Session::import`
//! - Exports of live sessions (with skipped keys cached) with one byte flipped
//!
//! # Invariants
//!
//! - Import never panics
//! - Every rejection is `CorruptState`
//! - An accepted session re-exports stably
//! - Encrypting on an accepted session never panics, and failure leaves it
//!   unchanged

#![no_main]

use arbitrary::Arbitrary;
use courier_crypto::{
    CryptoError, Device, SeededEnv, Session, accept_session, init_session,
};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum SessionInput {
    Raw(Vec<u8>),
    Flipped { seed: u64, skipped: u8, index: u16, mask: u8 },
}

fn live_session_bytes(seed: u64, skipped: u8) -> Vec<u8> {
    let env = SeededEnv::new(seed);
    let alice = Device::generate(&env).unwrap();
    let mut bob = Device::generate(&env).unwrap();
    let bundle = bob.publish_prekey_bundle(1, &env).unwrap();

    let (mut outbound, handshake) = init_session(&alice, &bundle, &env).unwrap();
    let mut inbound = accept_session(&mut bob, &handshake).unwrap();

    // Leave the first `skipped` messages undelivered so the cache is populated
    let mut last = None;
    for i in 0..=u32::from(skipped % 8) {
        last = Some(outbound.encrypt(&i.to_be_bytes(), &env).unwrap());
    }
    if let Some(envelope) = last {
        inbound.decrypt(&envelope).unwrap();
    }

    inbound.export()
}

fuzz_target!(|input: SessionInput| {
    let bytes = match input {
        SessionInput::Raw(bytes) => bytes,
        SessionInput::Flipped { seed, skipped, index, mask } => {
            let mut bytes = live_session_bytes(seed, skipped);
            let index = usize::from(index) % bytes.len();
            bytes[index] ^= mask.max(1);
            bytes
        },
    };

    match Session::import(&bytes) {
        Ok(mut session) => {
            let exported = session.export();
            let restored = Session::import(&exported).expect("re-import of accepted state failed");
            assert_eq!(restored.export(), exported);

            let env = SeededEnv::new(0);
            if session.encrypt(b"after import", &env).is_err() {
                assert_eq!(session.export(), exported, "failed encrypt mutated session state");
            }
        },
        Err(error) => {
            assert!(matches!(error, CryptoError::CorruptState { .. }), "unexpected error {error:?}");
        },
    }
});
