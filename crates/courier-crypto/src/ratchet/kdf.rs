//! Key derivation for the handshake, the root chain and message keys.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use crate::keys::{DhOutput, KEY_SIZE};

/// Label for the handshake secret expansion
const HANDSHAKE_LABEL: &[u8] = b"courierHandshakeV1";

/// Label for the root chain (DH ratchet step)
const ROOT_LABEL: &[u8] = b"courierRootV1";

/// Label for expanding a message key into cipher key and nonce
const MESSAGE_LABEL: &[u8] = b"courierMessageV1";

/// Size of the `XChaCha20` nonce
pub(crate) const NONCE_SIZE: usize = 24;

/// Domain separation prefix for X25519 handshake input
const HANDSHAKE_PREFIX: [u8; KEY_SIZE] = [0xFF; KEY_SIZE];

/// A root key together with the chain key derived alongside it.
pub(crate) struct RootStep {
    pub(crate) root_key: Zeroizing<[u8; KEY_SIZE]>,
    pub(crate) chain_key: Zeroizing<[u8; KEY_SIZE]>,
}

/// Derive the initial root key from the handshake Diffie-Hellman outputs.
///
/// `ikm = 0xFF^32 || DH1 || DH2 || DH3 || [DH4]`, salt is 32 zero bytes.
/// The fourth output is present only when a one-time prekey was used.
pub(crate) fn derive_handshake_secret(
    dh1: &DhOutput,
    dh2: &DhOutput,
    dh3: &DhOutput,
    dh4: Option<&DhOutput>,
) -> Zeroizing<[u8; KEY_SIZE]> {
    let mut ikm = Vec::with_capacity(KEY_SIZE * 5);
    ikm.extend_from_slice(&HANDSHAKE_PREFIX);
    ikm.extend_from_slice(dh1.as_bytes());
    ikm.extend_from_slice(dh2.as_bytes());
    ikm.extend_from_slice(dh3.as_bytes());
    if let Some(dh4) = dh4 {
        ikm.extend_from_slice(dh4.as_bytes());
    }

    let salt = [0u8; KEY_SIZE];
    let hkdf = Hkdf::<Sha256>::new(Some(&salt[..]), &ikm);
    ikm.zeroize();

    let mut root_key = Zeroizing::new([0u8; KEY_SIZE]);
    let Ok(()) = hkdf.expand(HANDSHAKE_LABEL, &mut root_key[..]) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };
    root_key
}

/// Root KDF for a DH ratchet step: `(RK', CK) = HKDF(salt = RK, ikm = DH)`.
pub(crate) fn kdf_root(root_key: &[u8; KEY_SIZE], dh_output: &DhOutput) -> RootStep {
    let hkdf = Hkdf::<Sha256>::new(Some(&root_key[..]), dh_output.as_bytes());
    split_expand(&hkdf, ROOT_LABEL)
}

/// Expand a single-use message key into the AEAD key and nonce.
pub(crate) fn expand_message_key(
    message_key: &[u8; KEY_SIZE],
) -> (Zeroizing<[u8; KEY_SIZE]>, [u8; NONCE_SIZE]) {
    let hkdf = Hkdf::<Sha256>::new(None, message_key);

    let mut output = Zeroizing::new([0u8; KEY_SIZE + NONCE_SIZE]);
    let Ok(()) = hkdf.expand(MESSAGE_LABEL, &mut output[..]) else {
        unreachable!("56 bytes is a valid HKDF-SHA256 output length");
    };

    let mut cipher_key = Zeroizing::new([0u8; KEY_SIZE]);
    cipher_key.copy_from_slice(&output[..KEY_SIZE]);
    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&output[KEY_SIZE..]);

    (cipher_key, nonce)
}

fn split_expand(hkdf: &Hkdf<Sha256>, label: &[u8]) -> RootStep {
    let mut output = Zeroizing::new([0u8; 2 * KEY_SIZE]);
    let Ok(()) = hkdf.expand(label, &mut output[..]) else {
        unreachable!("64 bytes is a valid HKDF-SHA256 output length");
    };

    let mut root_key = Zeroizing::new([0u8; KEY_SIZE]);
    let mut chain_key = Zeroizing::new([0u8; KEY_SIZE]);
    root_key.copy_from_slice(&output[..KEY_SIZE]);
    chain_key.copy_from_slice(&output[KEY_SIZE..]);

    RootStep { root_key, chain_key }
}
