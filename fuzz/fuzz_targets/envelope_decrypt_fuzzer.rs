//! Fuzz target for envelope decoding and decryption
//!
//! Feeds attacker-controlled envelopes into an established session.
//!
//! # Strategy
//!
//! - Raw bytes through `Envelope::from_bytes`
//! - Genuine envelopes with header fields or ciphertext mutated
//! - Replays and reordering of genuine envelopes
//!
//! # Invariants
//!
//! - Decode and decrypt never panic
//! - A failed decrypt leaves the exported session state byte-identical
//! - Mutated envelopes never decrypt to a different plaintext
//! - Every genuine envelope still decrypts once afterwards

#![no_main]

use arbitrary::Arbitrary;
use courier_crypto::{
    Device, Envelope, SeededEnv, Session, accept_session, init_session,
};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Scenario {
    seed: u64,
    messages: u8,
    attacks: Vec<Attack>,
}

#[derive(Debug, Arbitrary)]
enum Attack {
    Raw(Vec<u8>),
    FlipCiphertext { message: u8, index: u16, mask: u8 },
    Counter { message: u8, counter: u32 },
    PreviousChainLength { message: u8, length: u32 },
    Truncate { message: u8, keep: u16 },
    Replay { message: u8 },
}

fn establish(env: &SeededEnv) -> (Session, Session) {
    let alice = Device::generate(env).unwrap();
    let mut bob = Device::generate(env).unwrap();
    let bundle = bob.publish_prekey_bundle(1, env).unwrap();

    let (outbound, handshake) = init_session(&alice, &bundle, env).unwrap();
    let inbound = accept_session(&mut bob, &handshake).unwrap();
    (outbound, inbound)
}

fn attempt(session: &mut Session, envelope: &Envelope, genuine: Option<&[u8]>) -> bool {
    let before = session.export();
    match session.decrypt(envelope) {
        Ok(plaintext) => {
            if let Some(expected) = genuine {
                assert_eq!(plaintext, expected, "mutated envelope decrypted to other plaintext");
            }
            true
        },
        Err(_) => {
            assert_eq!(session.export(), before, "failed decrypt mutated session state");
            false
        },
    }
}

fuzz_target!(|scenario: Scenario| {
    let env = SeededEnv::new(scenario.seed);
    let (mut outbound, mut inbound) = establish(&env);

    let count = usize::from(scenario.messages % 16) + 1;
    let plaintexts: Vec<Vec<u8>> = (0..count).map(|i| format!("message {i}").into_bytes()).collect();
    let envelopes: Vec<Envelope> =
        plaintexts.iter().map(|plaintext| outbound.encrypt(plaintext, &env).unwrap()).collect();
    let mut delivered = vec![false; count];

    for attack in scenario.attacks.into_iter().take(32) {
        match attack {
            Attack::Raw(bytes) => {
                if let Ok(envelope) = Envelope::from_bytes(&bytes) {
                    if attempt(&mut inbound, &envelope, None) {
                        let i = envelopes.iter().position(|genuine| *genuine == envelope);
                        let i = i.expect("forged envelope decrypted");
                        assert!(!delivered[i]);
                        delivered[i] = true;
                    }
                }
            },
            Attack::FlipCiphertext { message, index, mask } => {
                let i = usize::from(message) % count;
                let mut envelope = envelopes[i].clone();
                let index = usize::from(index) % envelope.ciphertext.len();
                envelope.ciphertext[index] ^= mask.max(1);
                assert!(!attempt(&mut inbound, &envelope, None), "flipped ciphertext decrypted");
            },
            Attack::Counter { message, counter } => {
                let i = usize::from(message) % count;
                let mut envelope = envelopes[i].clone();
                let genuine = envelope.header.counter == counter;
                envelope.header.counter = counter;
                if attempt(&mut inbound, &envelope, Some(&plaintexts[i])) {
                    assert!(genuine && !delivered[i]);
                    delivered[i] = true;
                }
            },
            Attack::PreviousChainLength { message, length } => {
                let i = usize::from(message) % count;
                let mut envelope = envelopes[i].clone();
                let genuine = envelope.header.previous_chain_length == length;
                envelope.header.previous_chain_length = length;
                if attempt(&mut inbound, &envelope, Some(&plaintexts[i])) {
                    assert!(genuine && !delivered[i]);
                    delivered[i] = true;
                }
            },
            Attack::Truncate { message, keep } => {
                let i = usize::from(message) % count;
                let bytes = envelopes[i].to_bytes();
                let keep = usize::from(keep) % bytes.len();
                if let Ok(envelope) = Envelope::from_bytes(&bytes[..keep]) {
                    attempt(&mut inbound, &envelope, None);
                }
            },
            Attack::Replay { message } => {
                let i = usize::from(message) % count;
                let decrypted = attempt(&mut inbound, &envelopes[i], Some(&plaintexts[i]));
                assert_eq!(decrypted, !delivered[i], "replay outcome mismatch");
                delivered[i] = true;
            },
        }
    }

    for (i, envelope) in envelopes.iter().enumerate() {
        if !delivered[i] {
            let plaintext = inbound.decrypt(envelope).expect("genuine envelope rejected after attacks");
            assert_eq!(plaintext, plaintexts[i]);
        }
    }
});
