//! Symmetric chain ratchet for forward-secure message key derivation
//!
//! # Security Properties
//!
//! - Forward Secrecy: Old chain keys are overwritten when advancing
//! - Key Uniqueness: Each counter produces a unique message key
//! - Determinism: Same chain key always produces same key sequence

use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::{error::CryptoError, keys::KEY_SIZE};

type HmacSha256 = Hmac<Sha256>;

/// HMAC input for deriving a message key
const MESSAGE_INPUT: &[u8] = &[0x01];

/// HMAC input for deriving the next chain key
const CHAIN_INPUT: &[u8] = &[0x02];

/// A message key derived from a chain.
///
/// Used for exactly one encryption or decryption, then dropped (zeroized).
#[derive(Clone)]
pub(crate) struct MessageKey {
    key: [u8; KEY_SIZE],
    counter: u32,
}

impl MessageKey {
    pub(crate) fn from_parts(key: [u8; KEY_SIZE], counter: u32) -> Self {
        Self { key, counter }
    }

    /// 32-byte key material, expanded into AEAD key and nonce before use.
    pub(crate) fn key(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }

    /// Position in the chain this key was derived at.
    pub(crate) fn counter(&self) -> u32 {
        self.counter
    }
}

impl Drop for MessageKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Sending or receiving chain: a chain key and the counter of the next
/// message key it will produce.
///
/// Each [`advance()`](Self::advance) call:
/// 1. Derives a message key from the current chain key
/// 2. Derives the next chain key
/// 3. Overwrites the old chain key (forward secrecy)
#[derive(Clone)]
pub(crate) struct ChainKey {
    key: [u8; KEY_SIZE],
    counter: u32,
}

impl ChainKey {
    /// Fresh chain at counter zero.
    pub(crate) fn new(key: [u8; KEY_SIZE]) -> Self {
        Self { key, counter: 0 }
    }

    /// Restore a chain from persisted state.
    pub(crate) fn from_parts(key: [u8; KEY_SIZE], counter: u32) -> Self {
        Self { key, counter }
    }

    /// Counter of the next message key this chain produces.
    pub(crate) fn counter(&self) -> u32 {
        self.counter
    }

    pub(crate) fn key(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }

    /// Derive the message key for the current counter and step the chain.
    pub(crate) fn advance(&mut self) -> Result<MessageKey, CryptoError> {
        if self.counter == u32::MAX {
            return Err(CryptoError::invalid_request("chain counter exhausted"));
        }

        let message_key = self.derive(MESSAGE_INPUT);
        let next_chain_key = self.derive(CHAIN_INPUT);

        // Zeroize and replace the old chain key for forward secrecy
        self.key.zeroize();
        self.key = next_chain_key;

        let counter = self.counter;
        self.counter += 1;

        Ok(MessageKey { key: message_key, counter })
    }

    fn derive(&self, input: &[u8]) -> [u8; KEY_SIZE] {
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.key) else {
            unreachable!("HMAC-SHA256 accepts any key size");
        };
        mac.update(input);
        let result = mac.finalize().into_bytes();

        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&result);
        key
    }
}

impl Drop for ChainKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> [u8; KEY_SIZE] {
        let mut key = [0u8; KEY_SIZE];
        for (i, byte) in key.iter_mut().enumerate() {
            *byte = i as u8;
        }
        key
    }

    #[test]
    fn new_chain_starts_at_zero() {
        let chain = ChainKey::new(test_key());
        assert_eq!(chain.counter(), 0);
    }

    #[test]
    fn advance_increments_counter() {
        let mut chain = ChainKey::new(test_key());

        let key0 = chain.advance().unwrap();
        assert_eq!(key0.counter(), 0);
        assert_eq!(chain.counter(), 1);

        let key1 = chain.advance().unwrap();
        assert_eq!(key1.counter(), 1);
        assert_eq!(chain.counter(), 2);
    }

    #[test]
    fn advance_produces_unique_keys() {
        let mut chain = ChainKey::new(test_key());

        let key0 = chain.advance().unwrap();
        let key1 = chain.advance().unwrap();
        let key2 = chain.advance().unwrap();

        assert_ne!(key0.key(), key1.key(), "keys must be unique");
        assert_ne!(key1.key(), key2.key(), "keys must be unique");
        assert_ne!(key0.key(), key2.key(), "keys must be unique");
    }

    #[test]
    fn advance_overwrites_chain_key() {
        let mut chain = ChainKey::new(test_key());
        let _ = chain.advance().unwrap();

        assert_ne!(chain.key(), &test_key(), "old chain key must not survive advance");
    }

    #[test]
    fn chain_is_deterministic() {
        let mut chain1 = ChainKey::new(test_key());
        let mut chain2 = ChainKey::new(test_key());

        for _ in 0..10 {
            let key1 = chain1.advance().unwrap();
            let key2 = chain2.advance().unwrap();
            assert_eq!(key1.key(), key2.key(), "same chain key must produce same keys");
            assert_eq!(key1.counter(), key2.counter());
        }
    }

    #[test]
    fn restored_chain_continues_sequence() {
        let mut original = ChainKey::new(test_key());
        let _ = original.advance().unwrap();
        let _ = original.advance().unwrap();

        let mut restored = ChainKey::from_parts(*original.key(), original.counter());

        let expected = original.advance().unwrap();
        let actual = restored.advance().unwrap();
        assert_eq!(expected.key(), actual.key());
        assert_eq!(actual.counter(), 2);
    }

    #[test]
    fn exhausted_counter_is_rejected() {
        let mut chain = ChainKey::from_parts(test_key(), u32::MAX);

        let result = chain.advance();
        assert!(matches!(result, Err(CryptoError::InvalidRequest { .. })));
        assert_eq!(chain.counter(), u32::MAX);
    }
}
