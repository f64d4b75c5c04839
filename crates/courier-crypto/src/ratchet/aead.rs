//! Message encryption using `XChaCha20-Poly1305`
//!
//! The AEAD key and nonce are both expanded from the single-use message key,
//! so no nonce travels on the wire and a nonce can never repeat under the
//! same key.

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};

use super::{chain::MessageKey, kdf::expand_message_key};
use crate::error::CryptoError;

/// Poly1305 tag size (16 bytes)
pub(crate) const TAG_SIZE: usize = 16;

/// Encrypt `plaintext` under a message key, authenticating `associated_data`.
pub(crate) fn seal(message_key: &MessageKey, plaintext: &[u8], associated_data: &[u8]) -> Vec<u8> {
    let (cipher_key, nonce) = expand_message_key(message_key.key());
    let cipher = XChaCha20Poly1305::new((&*cipher_key).into());

    let payload = Payload { msg: plaintext, aad: associated_data };
    let Ok(ciphertext) = cipher.encrypt(XNonce::from_slice(&nonce), payload) else {
        unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };

    ciphertext
}

/// Decrypt and authenticate a ciphertext produced by [`seal`].
///
/// # Errors
///
/// - `DecryptionFailed`: truncated ciphertext, wrong key, or tampered
///   ciphertext or associated data
pub(crate) fn open(
    message_key: &MessageKey,
    ciphertext: &[u8],
    associated_data: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < TAG_SIZE {
        return Err(CryptoError::DecryptionFailed {
            reason: format!("ciphertext shorter than {TAG_SIZE}-byte tag"),
        });
    }

    let (cipher_key, nonce) = expand_message_key(message_key.key());
    let cipher = XChaCha20Poly1305::new((&*cipher_key).into());

    let payload = Payload { msg: ciphertext, aad: associated_data };
    cipher.decrypt(XNonce::from_slice(&nonce), payload).map_err(|_| {
        CryptoError::DecryptionFailed { reason: "authentication failed".to_string() }
    })
}
