//! Double Ratchet session state and the encrypt/decrypt operations.
//!
//! A session starts in one of two shapes:
//!
//! - Initiator: holds a sending chain derived from its handshake ephemeral
//!   key, no receiving chain until the responder answers.
//! - Responder: holds a receiving chain for the initiator's ephemeral key and
//!   no sending chain (awaiting first send). Its first `encrypt` performs a DH
//!   ratchet step.
//!
//! # Invariants
//!
//! - Every DH ratchet step derives a fresh root key and starts the new chain
//!   at counter zero.
//! - A message key is derived once. It is either consumed immediately or
//!   cached under `(ratchet key, counter)` and consumed from the cache.
//! - A failed `decrypt` leaves the session exactly as it was.

use std::collections::VecDeque;

use zeroize::{Zeroize, Zeroizing};

use super::{
    aead,
    chain::{ChainKey, MessageKey},
    envelope::{Envelope, Header},
    kdf::kdf_root,
    skipped::SkippedKeys,
};
use crate::{
    config::RatchetConfig,
    env::Environment,
    error::CryptoError,
    handshake::HandshakeMessage,
    keys::{IdentityPublicKey, KEY_SIZE, KeyPair, PublicKey},
};

/// Number of retired remote ratchet keys remembered for replay detection.
pub(crate) const MAX_RETIRED_RATCHET_KEYS: usize = 128;

/// Everything the handshake hands over to start a session.
pub(crate) struct Establishment {
    /// Root key from the handshake key agreement
    pub(crate) root_key: Zeroizing<[u8; KEY_SIZE]>,
    /// Initiator: handshake ephemeral key. Responder: signed prekey.
    pub(crate) local_ratchet: KeyPair,
    /// Initiator: responder's signed prekey. Responder: initiator's ephemeral.
    pub(crate) remote_ratchet: PublicKey,
    /// `IK_initiator || IK_responder`
    pub(crate) associated_data: Vec<u8>,
    pub(crate) remote_identity: IdentityPublicKey,
    pub(crate) config: RatchetConfig,
}

/// Complete mutable state of a session.
///
/// Cloned to stage a decrypt; the clone replaces the live state only when
/// every step succeeded.
#[derive(Clone)]
pub(crate) struct RatchetState {
    pub(crate) root_key: [u8; KEY_SIZE],
    pub(crate) sending: Option<ChainKey>,
    pub(crate) receiving: Option<ChainKey>,
    pub(crate) local_ratchet: KeyPair,
    pub(crate) remote_ratchet: PublicKey,
    /// Remote ratchet keys we ratcheted away from, oldest first
    pub(crate) retired_remote_ratchets: VecDeque<PublicKey>,
    pub(crate) previous_chain_length: u32,
    pub(crate) skipped: SkippedKeys,
    pub(crate) associated_data: Vec<u8>,
    pub(crate) remote_identity: IdentityPublicKey,
    pub(crate) pending_handshake: Option<HandshakeMessage>,
    pub(crate) config: RatchetConfig,
}

impl Drop for RatchetState {
    fn drop(&mut self) {
        self.root_key.zeroize();
    }
}

impl RatchetState {
    /// Run the establishment DH ratchet step shared by both roles.
    fn establish(establishment: Establishment) -> Result<(Self, ChainKey), CryptoError> {
        let dh = establishment.local_ratchet.diffie_hellman(&establishment.remote_ratchet)?;
        let step = kdf_root(&establishment.root_key, &dh);

        let state = Self {
            root_key: *step.root_key,
            sending: None,
            receiving: None,
            local_ratchet: establishment.local_ratchet,
            remote_ratchet: establishment.remote_ratchet,
            retired_remote_ratchets: VecDeque::new(),
            previous_chain_length: 0,
            skipped: SkippedKeys::new(establishment.config.max_skipped_keys as usize),
            associated_data: establishment.associated_data,
            remote_identity: establishment.remote_identity,
            pending_handshake: None,
            config: establishment.config,
        };
        Ok((state, ChainKey::new(*step.chain_key)))
    }

    /// Whether `ratchet_key` names the chain we are currently receiving on.
    fn is_current_receiving(&self, ratchet_key: &PublicKey) -> bool {
        self.receiving.is_some() && *ratchet_key == self.remote_ratchet
    }

    /// Advance the receiving chain to `until`, caching every key on the way.
    fn skip_receiving_to(&mut self, until: u32) -> Result<(), CryptoError> {
        let remote_ratchet = self.remote_ratchet;
        let Some(chain) = self.receiving.as_mut() else {
            return Ok(());
        };
        if until <= chain.counter() {
            return Ok(());
        }

        let gap = until - chain.counter();
        if gap > self.config.max_skip {
            return Err(CryptoError::TooManySkippedMessages {
                requested: gap,
                limit: self.config.max_skip,
            });
        }

        let mut evicted = 0;
        while chain.counter() < until {
            let message_key = chain.advance()?;
            evicted += self.skipped.insert(remote_ratchet, message_key);
        }

        if evicted > 0 {
            tracing::warn!(
                evicted,
                capacity = self.config.max_skipped_keys,
                "Skipped key cache full, evicted oldest keys"
            );
        }
        Ok(())
    }

    /// DH ratchet step for a new remote ratchet key.
    ///
    /// Derives the new receiving chain and retires the sending chain so the
    /// next `encrypt` ratchets with a fresh local key.
    fn ratchet_receiving(&mut self, remote_ratchet: PublicKey) -> Result<(), CryptoError> {
        let dh = self.local_ratchet.diffie_hellman(&remote_ratchet)?;
        let step = kdf_root(&self.root_key, &dh);

        if self.receiving.is_some() {
            if self.retired_remote_ratchets.len() == MAX_RETIRED_RATCHET_KEYS {
                self.retired_remote_ratchets.pop_front();
            }
            self.retired_remote_ratchets.push_back(self.remote_ratchet);
        }
        if let Some(sending) = self.sending.take() {
            self.previous_chain_length = sending.counter();
        }

        self.root_key = *step.root_key;
        self.receiving = Some(ChainKey::new(*step.chain_key));
        self.remote_ratchet = remote_ratchet;

        tracing::debug!(
            previous_chain_length = self.previous_chain_length,
            skipped = self.skipped.len(),
            "Receiving ratchet step"
        );
        Ok(())
    }

    /// Find or derive the message key for `header`.
    fn message_key_for(&mut self, header: &Header) -> Result<MessageKey, CryptoError> {
        if let Some(message_key) = self.skipped.take(&header.ratchet_key, header.counter) {
            return Ok(message_key);
        }

        if !self.is_current_receiving(&header.ratchet_key) {
            let is_known_chain = self.retired_remote_ratchets.contains(&header.ratchet_key)
                || self.skipped.contains_chain(&header.ratchet_key);
            if is_known_chain {
                return Err(CryptoError::DuplicateOrUnknownMessage { counter: header.counter });
            }

            self.skip_receiving_to(header.previous_chain_length)?;
            self.ratchet_receiving(header.ratchet_key)?;
        }

        let Some(receiving_counter) = self.receiving.as_ref().map(ChainKey::counter) else {
            return Err(CryptoError::corrupt("receiving chain missing after ratchet step"));
        };
        if header.counter < receiving_counter {
            return Err(CryptoError::DuplicateOrUnknownMessage { counter: header.counter });
        }

        self.skip_receiving_to(header.counter)?;
        match self.receiving.as_mut() {
            Some(chain) => chain.advance(),
            None => Err(CryptoError::corrupt("receiving chain missing after ratchet step")),
        }
    }
}

/// Established end-to-end session with one remote device.
///
/// Owned by a single caller; all mutation goes through [`Session::encrypt`]
/// and [`Session::decrypt`]. Persist with [`Session::export`] and restore
/// with [`Session::import`].
pub struct Session {
    pub(crate) state: RatchetState,
}

impl Session {
    /// Initiator session: sending chain ready, handshake attached to every
    /// outbound header until the first inbound message decrypts.
    pub(crate) fn initiator(
        establishment: Establishment,
        handshake: HandshakeMessage,
    ) -> Result<Self, CryptoError> {
        let (mut state, chain) = RatchetState::establish(establishment)?;
        state.sending = Some(chain);
        state.pending_handshake = Some(handshake);

        tracing::debug!("Initiator session established");
        Ok(Self { state })
    }

    /// Responder session: receiving chain ready, awaiting first send.
    pub(crate) fn responder(establishment: Establishment) -> Result<Self, CryptoError> {
        let (mut state, chain) = RatchetState::establish(establishment)?;
        state.receiving = Some(chain);

        tracing::debug!("Responder session established");
        Ok(Self { state })
    }

    /// Encrypt `plaintext` into an envelope for the remote device.
    ///
    /// Performs a DH ratchet step first when there is no sending chain.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest`: empty plaintext or exhausted sending chain
    /// - `Entropy`: ratchet key generation failed
    ///
    /// The session is unchanged on error.
    pub fn encrypt(
        &mut self,
        plaintext: &[u8],
        env: &impl Environment,
    ) -> Result<Envelope, CryptoError> {
        if plaintext.is_empty() {
            return Err(CryptoError::invalid_request("plaintext must not be empty"));
        }

        // Every fallible step runs before the session is touched
        let (ratchet_step, mut chain) = match &self.state.sending {
            Some(sending) => (None, sending.clone()),
            None => {
                let keypair = KeyPair::generate(env)?;
                let dh = keypair.diffie_hellman(&self.state.remote_ratchet)?;
                let step = kdf_root(&self.state.root_key, &dh);
                (Some((keypair, step.root_key)), ChainKey::new(*step.chain_key))
            },
        };
        let message_key = chain.advance()?;

        if let Some((keypair, root_key)) = ratchet_step {
            self.state.root_key = *root_key;
            self.state.local_ratchet = keypair;
            tracing::debug!(
                previous_chain_length = self.state.previous_chain_length,
                "Sending ratchet step"
            );
        }
        self.state.sending = Some(chain);

        let header = Header {
            ratchet_key: self.state.local_ratchet.public_key(),
            previous_chain_length: self.state.previous_chain_length,
            counter: message_key.counter(),
            handshake: self.state.pending_handshake.clone(),
        };
        let ciphertext = aead::seal(&message_key, plaintext, &self.aead_associated_data(&header));

        Ok(Envelope { header, ciphertext })
    }

    /// Decrypt an envelope from the remote device.
    ///
    /// Handles out-of-order delivery within the configured skip window.
    ///
    /// # Errors
    ///
    /// - `DecryptionFailed`: authentication failed
    /// - `DuplicateOrUnknownMessage`: message key already consumed or gone,
    ///   including replays from any remembered earlier ratchet key
    /// - `TooManySkippedMessages`: counter gap exceeds `max_skip`
    /// - `InvalidRequest`: header carries a low-order ratchet key
    ///
    /// The session is unchanged on error.
    pub fn decrypt(&mut self, envelope: &Envelope) -> Result<Vec<u8>, CryptoError> {
        let mut staged = self.state.clone();

        let message_key = staged.message_key_for(&envelope.header).inspect_err(|e| {
            if matches!(e, CryptoError::DuplicateOrUnknownMessage { .. }) {
                tracing::warn!(counter = envelope.header.counter, "Duplicate or unknown message");
            }
        })?;

        let associated_data = Self::associated_data_for(&staged, &envelope.header);
        let plaintext = aead::open(&message_key, &envelope.ciphertext, &associated_data)?;

        staged.pending_handshake = None;
        self.state = staged;
        Ok(plaintext)
    }

    /// Counter of the next outbound message, zero while awaiting first send.
    pub fn sending_counter(&self) -> u32 {
        self.state.sending.as_ref().map_or(0, ChainKey::counter)
    }

    /// Counter of the next expected inbound message on the current chain.
    pub fn receiving_counter(&self) -> u32 {
        self.state.receiving.as_ref().map_or(0, ChainKey::counter)
    }

    /// Number of cached skipped message keys.
    pub fn skipped_key_count(&self) -> usize {
        self.state.skipped.len()
    }

    /// Whether the next `encrypt` performs a DH ratchet step.
    pub fn is_awaiting_first_send(&self) -> bool {
        self.state.sending.is_none()
    }

    /// Identity of the remote device.
    pub fn remote_identity(&self) -> &IdentityPublicKey {
        &self.state.remote_identity
    }

    /// Ratchet public key carried in the headers this session sends.
    pub fn local_ratchet_public(&self) -> PublicKey {
        self.state.local_ratchet.public_key()
    }

    /// Length of the sending chain retired by the last receiving ratchet step.
    pub fn previous_chain_length(&self) -> u32 {
        self.state.previous_chain_length
    }

    /// Whether outbound headers still carry the handshake message.
    pub fn has_pending_handshake(&self) -> bool {
        self.state.pending_handshake.is_some()
    }

    /// Limits this session enforces.
    pub fn config(&self) -> RatchetConfig {
        self.state.config
    }

    fn aead_associated_data(&self, header: &Header) -> Vec<u8> {
        Self::associated_data_for(&self.state, header)
    }

    fn associated_data_for(state: &RatchetState, header: &Header) -> Vec<u8> {
        let mut associated_data = state.associated_data.clone();
        associated_data.extend_from_slice(&header.to_bytes());
        associated_data
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("remote_identity", &self.state.remote_identity)
            .field("sending_counter", &self.sending_counter())
            .field("receiving_counter", &self.receiving_counter())
            .field("skipped", &self.state.skipped.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::SeededEnv;

    fn identity(byte: u8) -> IdentityPublicKey {
        IdentityPublicKey { dh: PublicKey::from_bytes([byte; KEY_SIZE]), signing: [byte; KEY_SIZE] }
    }

    fn handshake(ephemeral: PublicKey) -> HandshakeMessage {
        HandshakeMessage {
            identity: identity(1),
            ephemeral_key: ephemeral,
            signed_prekey_id: 0,
            one_time_prekey_id: None,
        }
    }

    fn pair_with(config: RatchetConfig) -> (Session, Session) {
        let env = SeededEnv::new(11);
        let ephemeral = KeyPair::generate(&env).unwrap();
        let signed_prekey = KeyPair::generate(&env).unwrap();
        let associated_data = [identity(1).to_bytes(), identity(2).to_bytes()].concat();

        let alice = Session::initiator(
            Establishment {
                root_key: Zeroizing::new([5; KEY_SIZE]),
                local_ratchet: ephemeral.clone(),
                remote_ratchet: signed_prekey.public_key(),
                associated_data: associated_data.clone(),
                remote_identity: identity(2),
                config,
            },
            handshake(ephemeral.public_key()),
        )
        .unwrap();

        let bob = Session::responder(Establishment {
            root_key: Zeroizing::new([5; KEY_SIZE]),
            local_ratchet: signed_prekey,
            remote_ratchet: ephemeral.public_key(),
            associated_data,
            remote_identity: identity(1),
            config,
        })
        .unwrap();

        (alice, bob)
    }

    fn pair() -> (Session, Session) {
        pair_with(RatchetConfig::default())
    }

    #[test]
    fn initial_shapes() {
        let (alice, bob) = pair();

        assert!(!alice.is_awaiting_first_send());
        assert!(alice.has_pending_handshake());
        assert!(bob.is_awaiting_first_send());
        assert!(!bob.has_pending_handshake());
    }

    #[test]
    fn first_message_roundtrip() {
        let env = SeededEnv::new(1);
        let (mut alice, mut bob) = pair();

        let envelope = alice.encrypt(b"hello", &env).unwrap();
        assert!(envelope.header.handshake.is_some());
        assert_eq!(envelope.header.counter, 0);

        assert_eq!(bob.decrypt(&envelope).unwrap(), b"hello");
        assert_eq!(bob.receiving_counter(), 1);
    }

    #[test]
    fn empty_plaintext_is_rejected() {
        let env = SeededEnv::new(1);
        let (mut alice, _) = pair();

        let result = alice.encrypt(b"", &env);
        assert!(matches!(result, Err(CryptoError::InvalidRequest { .. })));
        assert_eq!(alice.sending_counter(), 0);
    }

    #[test]
    fn responder_ratchets_on_first_send() {
        let env = SeededEnv::new(2);
        let (mut alice, mut bob) = pair();

        let first = alice.encrypt(b"ping", &env).unwrap();
        bob.decrypt(&first).unwrap();

        let before = bob.local_ratchet_public();
        let reply = bob.encrypt(b"pong", &env).unwrap();

        assert_ne!(reply.header.ratchet_key, before);
        assert!(!bob.is_awaiting_first_send());
        assert_eq!(alice.decrypt(&reply).unwrap(), b"pong");
    }

    #[test]
    fn handshake_dropped_after_first_reply() {
        let env = SeededEnv::new(3);
        let (mut alice, mut bob) = pair();

        bob.decrypt(&alice.encrypt(b"one", &env).unwrap()).unwrap();
        let second = alice.encrypt(b"two", &env).unwrap();
        assert!(second.header.handshake.is_some());

        alice.decrypt(&bob.encrypt(b"reply", &env).unwrap()).unwrap();
        assert!(!alice.has_pending_handshake());

        let third = alice.encrypt(b"three", &env).unwrap();
        assert!(third.header.handshake.is_none());
        assert_eq!(bob.decrypt(&second).unwrap(), b"two");
        assert_eq!(bob.decrypt(&third).unwrap(), b"three");
    }

    #[test]
    fn ping_pong_ratchets_every_turn() {
        let env = SeededEnv::new(4);
        let (mut alice, mut bob) = pair();

        let mut keys = Vec::new();
        for round in 0..5u8 {
            let envelope = alice.encrypt(&[round; 8], &env).unwrap();
            keys.push(envelope.header.ratchet_key);
            assert_eq!(bob.decrypt(&envelope).unwrap(), vec![round; 8]);

            let envelope = bob.encrypt(&[round; 4], &env).unwrap();
            keys.push(envelope.header.ratchet_key);
            assert_eq!(alice.decrypt(&envelope).unwrap(), vec![round; 4]);
        }

        let mut unique = keys.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), keys.len(), "every turn uses a fresh ratchet key");
    }

    #[test]
    fn out_of_order_within_chain() {
        let env = SeededEnv::new(5);
        let (mut alice, mut bob) = pair();

        let envelopes: Vec<_> =
            (0..4u8).map(|i| alice.encrypt(&[i + 1], &env).unwrap()).collect();

        assert_eq!(bob.decrypt(&envelopes[3]).unwrap(), vec![4]);
        assert_eq!(bob.skipped_key_count(), 3);
        assert_eq!(bob.decrypt(&envelopes[1]).unwrap(), vec![2]);
        assert_eq!(bob.decrypt(&envelopes[0]).unwrap(), vec![1]);
        assert_eq!(bob.decrypt(&envelopes[2]).unwrap(), vec![3]);
        assert_eq!(bob.skipped_key_count(), 0);
    }

    #[test]
    fn late_message_from_previous_chain() {
        let env = SeededEnv::new(6);
        let (mut alice, mut bob) = pair();

        let early = alice.encrypt(b"early", &env).unwrap();
        let late = alice.encrypt(b"late", &env).unwrap();
        bob.decrypt(&early).unwrap();

        alice.decrypt(&bob.encrypt(b"reply", &env).unwrap()).unwrap();
        let next_chain = alice.encrypt(b"next", &env).unwrap();
        assert_eq!(next_chain.header.previous_chain_length, 2);

        // Harvests counter 1 of the old chain before ratcheting
        assert_eq!(bob.decrypt(&next_chain).unwrap(), b"next");
        assert_eq!(bob.skipped_key_count(), 1);
        assert_eq!(bob.decrypt(&late).unwrap(), b"late");
    }

    #[test]
    fn duplicate_is_rejected() {
        let env = SeededEnv::new(7);
        let (mut alice, mut bob) = pair();

        let envelope = alice.encrypt(b"once", &env).unwrap();
        bob.decrypt(&envelope).unwrap();

        let result = bob.decrypt(&envelope);
        assert_eq!(result, Err(CryptoError::DuplicateOrUnknownMessage { counter: 0 }));
    }

    #[test]
    fn duplicate_from_previous_chain_is_rejected() {
        let env = SeededEnv::new(8);
        let (mut alice, mut bob) = pair();

        let old = alice.encrypt(b"old", &env).unwrap();
        bob.decrypt(&old).unwrap();
        alice.decrypt(&bob.encrypt(b"reply", &env).unwrap()).unwrap();
        bob.decrypt(&alice.encrypt(b"new", &env).unwrap()).unwrap();

        let result = bob.decrypt(&old);
        assert!(matches!(result, Err(CryptoError::DuplicateOrUnknownMessage { .. })));
    }

    #[test]
    fn replay_from_older_epochs_is_rejected() {
        let env = SeededEnv::new(13);
        let (mut alice, mut bob) = pair();

        let mut sent = Vec::new();
        for turn in 0..4u8 {
            let envelope = alice.encrypt(&[turn], &env).unwrap();
            bob.decrypt(&envelope).unwrap();
            sent.push(envelope);
            alice.decrypt(&bob.encrypt(&[turn], &env).unwrap()).unwrap();
        }

        for envelope in &sent {
            let before = bob.state.retired_remote_ratchets.clone();
            assert_eq!(
                bob.decrypt(envelope),
                Err(CryptoError::DuplicateOrUnknownMessage { counter: 0 })
            );
            assert_eq!(bob.state.retired_remote_ratchets, before);
        }
    }

    #[test]
    fn retired_ratchet_keys_are_bounded() {
        let env = SeededEnv::new(14);
        let (mut alice, mut bob) = pair();

        for _ in 0..MAX_RETIRED_RATCHET_KEYS + 4 {
            bob.decrypt(&alice.encrypt(b"a", &env).unwrap()).unwrap();
            alice.decrypt(&bob.encrypt(b"b", &env).unwrap()).unwrap();
        }

        assert_eq!(bob.state.retired_remote_ratchets.len(), MAX_RETIRED_RATCHET_KEYS);
        assert_eq!(alice.state.retired_remote_ratchets.len(), MAX_RETIRED_RATCHET_KEYS);
    }

    #[test]
    fn tampered_ciphertext_leaves_session_unchanged() {
        let env = SeededEnv::new(9);
        let (mut alice, mut bob) = pair();

        let _skipped = alice.encrypt(b"first", &env).unwrap();
        let envelope = alice.encrypt(b"second", &env).unwrap();
        let mut tampered = envelope.clone();
        tampered.ciphertext[0] ^= 0x01;

        let result = bob.decrypt(&tampered);
        assert!(matches!(result, Err(CryptoError::DecryptionFailed { .. })));
        assert_eq!(bob.receiving_counter(), 0);
        assert_eq!(bob.skipped_key_count(), 0);

        assert_eq!(bob.decrypt(&envelope).unwrap(), b"second");
    }

    #[test]
    fn tampered_header_fails_authentication() {
        let env = SeededEnv::new(10);
        let (mut alice, mut bob) = pair();

        let envelope = alice.encrypt(b"message", &env).unwrap();
        let mut tampered = envelope.clone();
        tampered.header.previous_chain_length = 7;

        assert!(matches!(bob.decrypt(&tampered), Err(CryptoError::DecryptionFailed { .. })));
        assert_eq!(bob.decrypt(&envelope).unwrap(), b"message");
    }

    #[test]
    fn gap_beyond_max_skip_is_rejected() {
        let env = SeededEnv::new(11);
        let config = RatchetConfig { max_skip: 3, max_skipped_keys: 10 };
        let (mut alice, mut bob) = pair_with(config);

        let envelopes: Vec<_> = (0..5u8).map(|i| alice.encrypt(&[i], &env).unwrap()).collect();

        let result = bob.decrypt(&envelopes[4]);
        assert_eq!(result, Err(CryptoError::TooManySkippedMessages { requested: 4, limit: 3 }));
        assert_eq!(bob.receiving_counter(), 0);
        assert_eq!(bob.skipped_key_count(), 0);

        assert_eq!(bob.decrypt(&envelopes[3]).unwrap(), vec![3]);
        assert_eq!(bob.decrypt(&envelopes[4]).unwrap(), vec![4]);
    }

    #[test]
    fn cache_evicts_oldest_keys() {
        let env = SeededEnv::new(12);
        let config = RatchetConfig { max_skip: 3, max_skipped_keys: 4 };
        let (mut alice, mut bob) = pair_with(config);

        let envelopes: Vec<_> = (0..8u8).map(|i| alice.encrypt(&[i], &env).unwrap()).collect();

        bob.decrypt(&envelopes[3]).unwrap();
        bob.decrypt(&envelopes[7]).unwrap();
        assert_eq!(bob.skipped_key_count(), 4);

        // Counters 0 and 1 were evicted to make room for 4..=6
        assert!(matches!(
            bob.decrypt(&envelopes[0]),
            Err(CryptoError::DuplicateOrUnknownMessage { counter: 0 })
        ));
        assert_eq!(bob.decrypt(&envelopes[2]).unwrap(), vec![2]);
    }

    #[test]
    fn debug_output_is_redacted() {
        let (alice, _) = pair();
        let rendered = format!("{alice:?}");

        assert!(rendered.contains("Session"));
        assert!(!rendered.contains("root_key"));
    }
}
