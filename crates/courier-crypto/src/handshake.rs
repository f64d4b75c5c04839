//! X3DH asynchronous key agreement.
//!
//! The initiator fetches a [`PrekeyBundle`] and runs [`init_session`]
//! without the responder being online. The resulting [`HandshakeMessage`]
//! rides along in the headers of the initiator's first envelopes; the
//! responder feeds it to [`accept_session`] to derive the same root key.
//!
//! ```text
//! DH1 = DH(IK_A, SPK_B)
//! DH2 = DH(EK_A, IK_B)
//! DH3 = DH(EK_A, SPK_B)
//! DH4 = DH(EK_A, OPK_B)   only when a one-time prekey was used
//! ```
//!
//! Omitting the one-time prekey is legal; it only weakens protection
//! against a later compromise of the signed prekey.

use serde::{Deserialize, Serialize};

use crate::{
    env::Environment,
    error::CryptoError,
    identity::{Device, PrekeyBundle},
    keys::{IdentityPublicKey, KeyPair, PublicKey},
    ratchet::{
        Session,
        kdf::derive_handshake_secret,
        session::Establishment,
    },
};

/// Initiator's half of the handshake, delivered in envelope headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeMessage {
    /// Initiator's identity
    pub identity: IdentityPublicKey,
    /// Initiator's ephemeral key, also its first ratchet key
    pub ephemeral_key: PublicKey,
    /// Signed prekey the initiator used
    pub signed_prekey_id: u32,
    /// One-time prekey the initiator used, if the bundle had one
    pub one_time_prekey_id: Option<u32>,
}

/// `IK_initiator || IK_responder`, bound into every message's AEAD.
fn session_associated_data(
    initiator: &IdentityPublicKey,
    responder: &IdentityPublicKey,
) -> Vec<u8> {
    [initiator.to_bytes(), responder.to_bytes()].concat()
}

/// Start a session with the owner of `bundle`.
///
/// Uses the bundle's first one-time prekey when present.
///
/// # Errors
///
/// - `InvalidSignature`: the signed prekey signature does not verify
/// - `InvalidRequest`: the bundle carries a low-order key
/// - `Entropy`: ephemeral key generation failed
pub fn init_session(
    device: &Device,
    bundle: &PrekeyBundle,
    env: &impl Environment,
) -> Result<(Session, HandshakeMessage), CryptoError> {
    bundle.verify_signature().inspect_err(|_| {
        tracing::warn!(
            identity = %bundle.identity.fingerprint(),
            signed_prekey_id = bundle.signed_prekey_id,
            "Rejected prekey bundle with invalid signature"
        );
    })?;

    let ephemeral = KeyPair::generate(env)?;
    let one_time_prekey = bundle.one_time_prekey();

    let dh1 = device.identity.dh().diffie_hellman(&bundle.signed_prekey)?;
    let dh2 = ephemeral.diffie_hellman(&bundle.identity.dh)?;
    let dh3 = ephemeral.diffie_hellman(&bundle.signed_prekey)?;
    let dh4 = one_time_prekey
        .map(|prekey| ephemeral.diffie_hellman(&prekey.public_key))
        .transpose()?;
    let root_key = derive_handshake_secret(&dh1, &dh2, &dh3, dh4.as_ref());

    let local_identity = device.identity_public();
    let handshake = HandshakeMessage {
        identity: local_identity,
        ephemeral_key: ephemeral.public_key(),
        signed_prekey_id: bundle.signed_prekey_id,
        one_time_prekey_id: one_time_prekey.map(|prekey| prekey.id),
    };

    let session = Session::initiator(
        Establishment {
            root_key,
            local_ratchet: ephemeral,
            remote_ratchet: bundle.signed_prekey,
            associated_data: session_associated_data(&local_identity, &bundle.identity),
            remote_identity: bundle.identity,
            config: device.config.ratchet,
        },
        handshake.clone(),
    )?;

    tracing::debug!(
        remote = %bundle.identity.fingerprint(),
        signed_prekey_id = handshake.signed_prekey_id,
        one_time_prekey_id = ?handshake.one_time_prekey_id,
        "Initiated session"
    );

    Ok((session, handshake))
}

/// Accept a session started by a peer's [`init_session`].
///
/// The referenced one-time prekey is removed from `device` once the session
/// is established, so the same handshake cannot be accepted twice.
///
/// # Errors
///
/// - `UnknownPrekey`: the signed or one-time prekey is not held
/// - `InvalidRequest`: the handshake carries a malformed or low-order key
pub fn accept_session(
    device: &mut Device,
    handshake: &HandshakeMessage,
) -> Result<Session, CryptoError> {
    if !handshake.identity.is_well_formed() {
        return Err(CryptoError::invalid_request("initiator identity is not a valid key"));
    }

    let Some(signed_prekey) = device.signed_prekey_by_id(handshake.signed_prekey_id) else {
        return Err(CryptoError::UnknownPrekey { kind: "signed", id: handshake.signed_prekey_id });
    };
    let one_time_prekey = match handshake.one_time_prekey_id {
        None => None,
        Some(id) => match device.one_time_prekey(id) {
            Some(keypair) => Some(keypair),
            None => return Err(CryptoError::UnknownPrekey { kind: "one-time", id }),
        },
    };

    let dh1 = signed_prekey.keypair.diffie_hellman(&handshake.identity.dh)?;
    let dh2 = device.identity.dh().diffie_hellman(&handshake.ephemeral_key)?;
    let dh3 = signed_prekey.keypair.diffie_hellman(&handshake.ephemeral_key)?;
    let dh4 = one_time_prekey
        .map(|keypair| keypair.diffie_hellman(&handshake.ephemeral_key))
        .transpose()?;
    let root_key = derive_handshake_secret(&dh1, &dh2, &dh3, dh4.as_ref());

    let session = Session::responder(Establishment {
        root_key,
        local_ratchet: signed_prekey.keypair.clone(),
        remote_ratchet: handshake.ephemeral_key,
        associated_data: session_associated_data(&handshake.identity, &device.identity_public()),
        remote_identity: handshake.identity,
        config: device.config.ratchet,
    })?;

    if let Some(id) = handshake.one_time_prekey_id {
        device.consume_one_time_prekey(id);
    }

    tracing::debug!(
        remote = %handshake.identity.fingerprint(),
        signed_prekey_id = handshake.signed_prekey_id,
        one_time_prekey_id = ?handshake.one_time_prekey_id,
        "Accepted session"
    );

    Ok(session)
}
