//! Key types: X25519 key agreement and Ed25519 identity signatures.
//!
//! Secret material lives in [`KeyPair`] and [`IdentityKeyPair`] and is
//! zeroized on drop. Public halves are plain `Copy` values that can be
//! serialized and published freely.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{env::Environment, error::CryptoError};

/// Size of X25519 and Ed25519 keys in bytes
pub const KEY_SIZE: usize = 32;

/// Size of an Ed25519 signature in bytes
pub const SIGNATURE_SIZE: usize = 64;

/// X25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PublicKey([u8; KEY_SIZE]);

impl PublicKey {
    /// Wrap raw key bytes.
    ///
    /// No validation happens here; low-order points are rejected when the
    /// key is used in a Diffie-Hellman exchange.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    fn to_x25519(self) -> X25519PublicKey {
        X25519PublicKey::from(self.0)
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({}..)", hex::encode(&self.0[..4]))
    }
}

/// Output of a Diffie-Hellman exchange, zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct DhOutput([u8; KEY_SIZE]);

impl DhOutput {
    pub(crate) fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

/// X25519 keypair. The secret half is zeroized on drop.
#[derive(Clone)]
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a fresh keypair from the environment's entropy.
    pub fn generate(env: &impl Environment) -> Result<Self, CryptoError> {
        let mut seed: [u8; KEY_SIZE] = env.random_array()?;
        let keypair = Self::from_secret_bytes(seed);
        seed.zeroize();
        Ok(keypair)
    }

    /// Rebuild a keypair from its secret scalar (used by state import).
    pub(crate) fn from_secret_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey(*X25519PublicKey::from(&secret).as_bytes());
        Self { secret, public }
    }

    /// Public half of this keypair.
    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// Secret scalar bytes, for state export only.
    pub(crate) fn secret_bytes(&self) -> [u8; KEY_SIZE] {
        self.secret.to_bytes()
    }

    /// Diffie-Hellman with a peer public key.
    ///
    /// Rejects non-contributory results, which occur when the peer supplies
    /// a low-order point and would force a predictable shared secret.
    pub(crate) fn diffie_hellman(&self, peer: &PublicKey) -> Result<DhOutput, CryptoError> {
        let shared = self.secret.diffie_hellman(&peer.to_x25519());
        if !shared.was_contributory() {
            return Err(CryptoError::invalid_request("peer public key is a low-order point"));
        }
        Ok(DhOutput(*shared.as_bytes()))
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair").field("public", &self.public).finish_non_exhaustive()
    }
}

/// Public half of a device identity: key agreement and signature keys.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityPublicKey {
    /// X25519 key used in the handshake Diffie-Hellman exchanges
    pub dh: PublicKey,
    /// Ed25519 verifying key used for signed prekey signatures
    pub signing: [u8; KEY_SIZE],
}

impl IdentityPublicKey {
    /// Concatenated encoding `dh || signing`.
    pub fn to_bytes(&self) -> [u8; 2 * KEY_SIZE] {
        let mut bytes = [0u8; 2 * KEY_SIZE];
        bytes[..KEY_SIZE].copy_from_slice(self.dh.as_bytes());
        bytes[KEY_SIZE..].copy_from_slice(&self.signing);
        bytes
    }

    /// Hex SHA-256 of the encoded identity, for out-of-band comparison.
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(self.to_bytes()))
    }

    /// Verify an Ed25519 signature made by this identity.
    ///
    /// Uses strict verification so malleable signatures and weak keys are
    /// rejected.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        let verifying_key =
            VerifyingKey::from_bytes(&self.signing).map_err(|_| CryptoError::InvalidSignature)?;
        let signature =
            Signature::from_slice(signature).map_err(|_| CryptoError::InvalidSignature)?;
        verifying_key.verify_strict(message, &signature).map_err(|_| CryptoError::InvalidSignature)
    }

    /// Whether the signing half decodes to a valid Ed25519 point.
    pub(crate) fn is_well_formed(&self) -> bool {
        VerifyingKey::from_bytes(&self.signing).is_ok()
    }
}

impl std::fmt::Debug for IdentityPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IdentityPublicKey({}..)", &self.fingerprint()[..16])
    }
}

/// Long-term device identity: an Ed25519 signing key plus an X25519 key.
#[derive(Clone)]
pub struct IdentityKeyPair {
    signing: SigningKey,
    dh: KeyPair,
}

impl IdentityKeyPair {
    /// Generate a fresh identity.
    pub fn generate(env: &impl Environment) -> Result<Self, CryptoError> {
        let mut seed: [u8; KEY_SIZE] = env.random_array()?;
        let signing = SigningKey::from_bytes(&seed);
        seed.zeroize();
        let dh = KeyPair::generate(env)?;
        Ok(Self { signing, dh })
    }

    pub(crate) fn from_secret_bytes(signing: [u8; KEY_SIZE], dh: [u8; KEY_SIZE]) -> Self {
        Self { signing: SigningKey::from_bytes(&signing), dh: KeyPair::from_secret_bytes(dh) }
    }

    /// Public identity to publish.
    pub fn public(&self) -> IdentityPublicKey {
        IdentityPublicKey {
            dh: self.dh.public_key(),
            signing: self.signing.verifying_key().to_bytes(),
        }
    }

    pub(crate) fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
        self.signing.sign(message).to_bytes()
    }

    pub(crate) fn dh(&self) -> &KeyPair {
        &self.dh
    }

    pub(crate) fn signing_secret_bytes(&self) -> [u8; KEY_SIZE] {
        self.signing.to_bytes()
    }
}

impl std::fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityKeyPair").field("public", &self.public()).finish_non_exhaustive()
    }
}
