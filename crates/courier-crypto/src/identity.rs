//! Device identity and prekey management.
//!
//! A [`Device`] owns the long-term identity, the current (and previous)
//! signed prekey and the pool of unconsumed one-time prekeys. It produces
//! [`PrekeyBundle`]s for the key service and hands prekey secrets to the
//! handshake when a peer initiates a session.
//!
//! # Invariants
//!
//! - One-time prekey ids are issued from a strictly increasing counter and
//!   never reused, even after the key is consumed.
//! - The identity and signed prekeys never change except through
//!   [`Device::rotate_signed_prekey`].
//! - Failed operations leave the device unchanged.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    config::DeviceConfig,
    env::Environment,
    error::CryptoError,
    keys::{IdentityKeyPair, IdentityPublicKey, KeyPair, PublicKey, SIGNATURE_SIZE},
};

/// Domain separation label for signed prekey signatures
const SIGNED_PREKEY_LABEL: &[u8] = b"courierSignedPrekeyV1";

/// Message signed by the identity key to vouch for a signed prekey.
///
/// `label || identity.dh || identity.signing || id (BE) || prekey`
pub(crate) fn signed_prekey_message(
    identity: &IdentityPublicKey,
    id: u32,
    prekey: &PublicKey,
) -> Vec<u8> {
    let mut message = Vec::with_capacity(SIGNED_PREKEY_LABEL.len() + 4 * 32 + 4);
    message.extend_from_slice(SIGNED_PREKEY_LABEL);
    message.extend_from_slice(&identity.to_bytes());
    message.extend_from_slice(&id.to_be_bytes());
    message.extend_from_slice(prekey.as_bytes());
    message
}

/// Published one-time prekey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneTimePrekey {
    /// Identifier echoed back in the handshake message
    pub id: u32,
    /// X25519 public key
    pub public_key: PublicKey,
}

/// Public key material a peer needs to start a session with this device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrekeyBundle {
    /// Identity of the publishing device
    pub identity: IdentityPublicKey,
    /// Identifier of the signed prekey
    pub signed_prekey_id: u32,
    /// Medium-term X25519 prekey
    pub signed_prekey: PublicKey,
    /// Ed25519 signature over the signed prekey by the identity key
    pub signed_prekey_signature: Vec<u8>,
    /// One-time prekeys, in issue order
    pub one_time_prekeys: Vec<OneTimePrekey>,
}

impl PrekeyBundle {
    /// Verify the signed prekey signature against the bundle's identity.
    ///
    /// # Errors
    ///
    /// - `InvalidSignature`: signature malformed or made by another key
    pub fn verify_signature(&self) -> Result<(), CryptoError> {
        let message =
            signed_prekey_message(&self.identity, self.signed_prekey_id, &self.signed_prekey);
        self.identity.verify(&message, &self.signed_prekey_signature)
    }

    /// One-time prekey a handshake against this bundle uses: the first one.
    pub fn one_time_prekey(&self) -> Option<&OneTimePrekey> {
        self.one_time_prekeys.first()
    }

    /// Bundle as handed out by the key service for one handshake: the signed
    /// prekey plus at most the requested one-time prekey.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest`: `one_time_prekey_id` is not part of this bundle
    pub fn for_handshake(&self, one_time_prekey_id: Option<u32>) -> Result<Self, CryptoError> {
        let one_time_prekeys = match one_time_prekey_id {
            None => Vec::new(),
            Some(id) => {
                let Some(prekey) = self.one_time_prekeys.iter().find(|prekey| prekey.id == id)
                else {
                    return Err(CryptoError::invalid_request(format!(
                        "one-time prekey {id} is not in this bundle"
                    )));
                };
                vec![*prekey]
            },
        };

        Ok(Self { one_time_prekeys, ..self.clone() })
    }
}

/// Signed prekey with its secret half and signature.
#[derive(Clone)]
pub(crate) struct SignedPrekey {
    pub(crate) id: u32,
    pub(crate) keypair: KeyPair,
    pub(crate) signature: [u8; SIGNATURE_SIZE],
}

impl SignedPrekey {
    fn generate(
        identity: &IdentityKeyPair,
        id: u32,
        env: &impl Environment,
    ) -> Result<Self, CryptoError> {
        let keypair = KeyPair::generate(env)?;
        let message = signed_prekey_message(&identity.public(), id, &keypair.public_key());
        let signature = identity.sign(&message);
        Ok(Self { id, keypair, signature })
    }
}

/// A local installation: identity, prekeys and prekey bookkeeping.
///
/// Persist with [`Device::export`] and restore with [`Device::import`].
pub struct Device {
    pub(crate) identity: IdentityKeyPair,
    pub(crate) signed_prekey: Option<SignedPrekey>,
    /// Replaced by the last rotation, still accepted by handshakes
    pub(crate) previous_signed_prekey: Option<SignedPrekey>,
    pub(crate) one_time_prekeys: BTreeMap<u32, KeyPair>,
    pub(crate) next_otk_id: u32,
    pub(crate) next_signed_prekey_id: u32,
    pub(crate) config: DeviceConfig,
}

impl Device {
    /// Fresh device with default limits: new identity, no prekeys.
    ///
    /// # Errors
    ///
    /// - `Entropy`: the entropy source failed
    pub fn generate(env: &impl Environment) -> Result<Self, CryptoError> {
        Self::with_config(DeviceConfig::default(), env)
    }

    /// Fresh device with explicit limits.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest`: incoherent limits
    /// - `Entropy`: the entropy source failed
    pub fn with_config(config: DeviceConfig, env: &impl Environment) -> Result<Self, CryptoError> {
        config.validate()?;
        let identity = IdentityKeyPair::generate(env)?;

        tracing::debug!(fingerprint = %identity.public().fingerprint(), "Generated device identity");

        Ok(Self {
            identity,
            signed_prekey: None,
            previous_signed_prekey: None,
            one_time_prekeys: BTreeMap::new(),
            next_otk_id: 0,
            next_signed_prekey_id: 0,
            config,
        })
    }

    /// Mint `count` one-time prekeys and return the bundle to publish.
    ///
    /// Generates the signed prekey on first use, otherwise reuses it.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest`: `count` above `max_bundle_size`, retention limit
    ///   reached, or one-time prekey ids exhausted
    /// - `Entropy`: the entropy source failed
    pub fn publish_prekey_bundle(
        &mut self,
        count: u32,
        env: &impl Environment,
    ) -> Result<PrekeyBundle, CryptoError> {
        if count > self.config.max_bundle_size {
            return Err(CryptoError::invalid_request(format!(
                "bundle size {count} exceeds limit {}",
                self.config.max_bundle_size
            )));
        }

        let retained = self.one_time_prekeys.len() as u64 + u64::from(count);
        if retained > u64::from(self.config.max_retained_one_time_prekeys) {
            return Err(CryptoError::invalid_request(format!(
                "device would retain {retained} one-time prekeys, limit {}",
                self.config.max_retained_one_time_prekeys
            )));
        }

        let Some(next_otk_id) = self.next_otk_id.checked_add(count) else {
            return Err(CryptoError::invalid_request("one-time prekey ids exhausted"));
        };

        let (signed_prekey, next_signed_prekey_id) = match &self.signed_prekey {
            Some(existing) => (existing.clone(), self.next_signed_prekey_id),
            None => self.next_signed_prekey(env)?,
        };

        let mut minted = Vec::with_capacity(count as usize);
        for id in self.next_otk_id..next_otk_id {
            minted.push((id, KeyPair::generate(env)?));
        }

        let one_time_prekeys = minted
            .iter()
            .map(|(id, keypair)| OneTimePrekey { id: *id, public_key: keypair.public_key() })
            .collect();

        tracing::debug!(
            first_id = self.next_otk_id,
            count,
            signed_prekey_id = signed_prekey.id,
            "Published prekey bundle"
        );

        self.one_time_prekeys.extend(minted);
        self.next_otk_id = next_otk_id;
        self.next_signed_prekey_id = next_signed_prekey_id;
        let bundle = self.bundle_for(&signed_prekey, one_time_prekeys);
        self.signed_prekey = Some(signed_prekey);

        Ok(bundle)
    }

    /// Replace the signed prekey with a fresh one.
    ///
    /// The replaced prekey stays usable for handshakes until the next
    /// rotation. Returns a bundle with no one-time prekeys for
    /// re-publication.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest`: signed prekey ids exhausted
    /// - `Entropy`: the entropy source failed
    pub fn rotate_signed_prekey(
        &mut self,
        env: &impl Environment,
    ) -> Result<PrekeyBundle, CryptoError> {
        let (signed_prekey, next_signed_prekey_id) = self.next_signed_prekey(env)?;

        tracing::debug!(
            signed_prekey_id = signed_prekey.id,
            previous = ?self.signed_prekey.as_ref().map(|prekey| prekey.id),
            "Rotated signed prekey"
        );

        let bundle = self.bundle_for(&signed_prekey, Vec::new());
        self.previous_signed_prekey = self.signed_prekey.replace(signed_prekey);
        self.next_signed_prekey_id = next_signed_prekey_id;

        Ok(bundle)
    }

    /// Public identity of this device.
    pub fn identity_public(&self) -> IdentityPublicKey {
        self.identity.public()
    }

    /// Hex SHA-256 fingerprint of the identity, for out-of-band comparison.
    pub fn fingerprint(&self) -> String {
        self.identity.public().fingerprint()
    }

    /// Id the next minted one-time prekey receives.
    pub fn next_one_time_prekey_id(&self) -> u32 {
        self.next_otk_id
    }

    /// Ids of unconsumed one-time prekeys, ascending.
    pub fn one_time_prekey_ids(&self) -> Vec<u32> {
        self.one_time_prekeys.keys().copied().collect()
    }

    /// Whether one-time prekey `id` is still available for a handshake.
    pub fn has_one_time_prekey(&self, id: u32) -> bool {
        self.one_time_prekeys.contains_key(&id)
    }

    /// Id of the current signed prekey, if one was generated.
    pub fn signed_prekey_id(&self) -> Option<u32> {
        self.signed_prekey.as_ref().map(|prekey| prekey.id)
    }

    /// Limits this device enforces.
    pub fn config(&self) -> DeviceConfig {
        self.config
    }

    /// Current or previous signed prekey with the given id.
    pub(crate) fn signed_prekey_by_id(&self, id: u32) -> Option<&SignedPrekey> {
        [self.signed_prekey.as_ref(), self.previous_signed_prekey.as_ref()]
            .into_iter()
            .flatten()
            .find(|prekey| prekey.id == id)
    }

    pub(crate) fn one_time_prekey(&self, id: u32) -> Option<&KeyPair> {
        self.one_time_prekeys.get(&id)
    }

    pub(crate) fn consume_one_time_prekey(&mut self, id: u32) -> Option<KeyPair> {
        let keypair = self.one_time_prekeys.remove(&id);
        if keypair.is_some() {
            tracing::debug!(id, remaining = self.one_time_prekeys.len(), "Consumed one-time prekey");
        }
        keypair
    }

    /// Generate the next signed prekey without installing it.
    fn next_signed_prekey(
        &self,
        env: &impl Environment,
    ) -> Result<(SignedPrekey, u32), CryptoError> {
        let id = self.next_signed_prekey_id;
        let Some(next_id) = id.checked_add(1) else {
            return Err(CryptoError::invalid_request("signed prekey ids exhausted"));
        };
        Ok((SignedPrekey::generate(&self.identity, id, env)?, next_id))
    }

    fn bundle_for(
        &self,
        signed_prekey: &SignedPrekey,
        one_time_prekeys: Vec<OneTimePrekey>,
    ) -> PrekeyBundle {
        PrekeyBundle {
            identity: self.identity.public(),
            signed_prekey_id: signed_prekey.id,
            signed_prekey: signed_prekey.keypair.public_key(),
            signed_prekey_signature: signed_prekey.signature.to_vec(),
            one_time_prekeys,
        }
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("identity", &self.identity.public())
            .field("signed_prekey_id", &self.signed_prekey_id())
            .field("one_time_prekeys", &self.one_time_prekeys.len())
            .field("next_otk_id", &self.next_otk_id)
            .finish_non_exhaustive()
    }
}
