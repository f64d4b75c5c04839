//! Wire envelope: ratchet header plus AEAD ciphertext.
//!
//! The header travels in the clear and is authenticated as associated data
//! through [`Header::to_bytes`], a fixed big-endian encoding that does not
//! depend on how the relay chooses to serialize the envelope.

use serde::{Deserialize, Serialize};

use crate::{
    handshake::HandshakeMessage,
    keys::{KEY_SIZE, PublicKey},
};

/// Version byte leading the canonical header encoding.
const HEADER_VERSION: u8 = 0x01;

/// Per-message metadata sent alongside the ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Sender's current ratchet public key
    pub ratchet_key: PublicKey,
    /// Length of the sender's previous sending chain
    pub previous_chain_length: u32,
    /// Position of this message in the sender's current sending chain
    pub counter: u32,
    /// Handshake the receiver needs to establish the session, carried until
    /// the initiator hears back from the responder
    pub handshake: Option<HandshakeMessage>,
}

impl Header {
    /// Canonical encoding bound into the AEAD associated data.
    ///
    /// Layout (big endian):
    ///
    /// ```text
    /// version(1) || ratchet_key(32) || previous_chain_length(4) || counter(4)
    ///   || has_handshake(1) || [handshake]
    /// handshake = identity.dh(32) || identity.signing(32) || ephemeral(32)
    ///   || signed_prekey_id(4) || has_one_time(1) || [one_time_prekey_id(4)]
    /// ```
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + KEY_SIZE + 8 + 1 + 4 * KEY_SIZE + 9);
        bytes.push(HEADER_VERSION);
        bytes.extend_from_slice(self.ratchet_key.as_bytes());
        bytes.extend_from_slice(&self.previous_chain_length.to_be_bytes());
        bytes.extend_from_slice(&self.counter.to_be_bytes());

        match &self.handshake {
            None => bytes.push(0),
            Some(handshake) => {
                bytes.push(1);
                bytes.extend_from_slice(&handshake.identity.to_bytes());
                bytes.extend_from_slice(handshake.ephemeral_key.as_bytes());
                bytes.extend_from_slice(&handshake.signed_prekey_id.to_be_bytes());
                match handshake.one_time_prekey_id {
                    None => bytes.push(0),
                    Some(id) => {
                        bytes.push(1);
                        bytes.extend_from_slice(&id.to_be_bytes());
                    },
                }
            },
        }

        bytes
    }
}

/// Encrypted message as handed to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Authenticated cleartext header
    pub header: Header,
    /// Ciphertext with the Poly1305 tag appended
    pub ciphertext: Vec<u8>,
}
