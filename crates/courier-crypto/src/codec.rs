//! Persistence and wire encoding.
//!
//! Device and session state are exported as versioned CBOR documents that
//! carry every secret needed to resume (identity, prekeys, root and chain
//! keys, skipped message keys). The intermediate state structs zeroize on
//! drop so secrets do not outlive the call.
//!
//! Import validates structure and cross-field consistency before building
//! anything. Local state that fails validation is [`CryptoError::CorruptState`];
//! malformed wire objects from peers are [`CryptoError::InvalidRequest`].

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    config::{DeviceConfig, RatchetConfig},
    error::CryptoError,
    handshake::HandshakeMessage,
    identity::{Device, PrekeyBundle, SignedPrekey, signed_prekey_message},
    keys::{IdentityKeyPair, IdentityPublicKey, KEY_SIZE, KeyPair, PublicKey, SIGNATURE_SIZE},
    ratchet::{
        Envelope, Session,
        chain::{ChainKey, MessageKey},
        session::{MAX_RETIRED_RATCHET_KEYS, RatchetState},
        skipped::SkippedKeys,
    },
};

/// Version of the persisted state format
const STATE_VERSION: u8 = 1;

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct SignedPrekeyState {
    id: u32,
    secret: [u8; KEY_SIZE],
    signature: Vec<u8>,
}

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct OneTimePrekeyState {
    id: u32,
    secret: [u8; KEY_SIZE],
}

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct DeviceState {
    version: u8,
    identity_signing: [u8; KEY_SIZE],
    identity_dh: [u8; KEY_SIZE],
    signed_prekey: Option<SignedPrekeyState>,
    previous_signed_prekey: Option<SignedPrekeyState>,
    one_time_prekeys: Vec<OneTimePrekeyState>,
    next_otk_id: u32,
    next_signed_prekey_id: u32,
    #[zeroize(skip)]
    config: DeviceConfig,
}

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct ChainState {
    key: [u8; KEY_SIZE],
    counter: u32,
}

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct SkippedKeyState {
    #[zeroize(skip)]
    ratchet_key: PublicKey,
    counter: u32,
    key: [u8; KEY_SIZE],
}

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct SessionState {
    version: u8,
    root_key: [u8; KEY_SIZE],
    sending: Option<ChainState>,
    receiving: Option<ChainState>,
    local_ratchet: [u8; KEY_SIZE],
    #[zeroize(skip)]
    remote_ratchet: PublicKey,
    /// Oldest first
    #[zeroize(skip)]
    retired_remote_ratchets: Vec<PublicKey>,
    previous_chain_length: u32,
    /// Oldest first, so re-insertion reproduces eviction order
    skipped: Vec<SkippedKeyState>,
    associated_data: Vec<u8>,
    #[zeroize(skip)]
    remote_identity: IdentityPublicKey,
    #[zeroize(skip)]
    pending_handshake: Option<HandshakeMessage>,
    #[zeroize(skip)]
    config: RatchetConfig,
}

fn encode<T: Serialize>(value: &T) -> Vec<u8> {
    let mut bytes = Vec::new();
    let Ok(()) = ciborium::ser::into_writer(value, &mut bytes) else {
        unreachable!("CBOR encoding into a Vec cannot fail");
    };
    bytes
}

fn decode_state<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CryptoError> {
    ciborium::de::from_reader(bytes)
        .map_err(|e| CryptoError::corrupt(format!("CBOR decode failed: {e}")))
}

fn decode_wire<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CryptoError> {
    ciborium::de::from_reader(bytes)
        .map_err(|e| CryptoError::invalid_request(format!("CBOR decode failed: {e}")))
}

fn check_version(version: u8) -> Result<(), CryptoError> {
    if version != STATE_VERSION {
        return Err(CryptoError::corrupt(format!(
            "unsupported state version {version}, expected {STATE_VERSION}"
        )));
    }
    Ok(())
}

impl SignedPrekeyState {
    fn export(prekey: &SignedPrekey) -> Self {
        Self {
            id: prekey.id,
            secret: prekey.keypair.secret_bytes(),
            signature: prekey.signature.to_vec(),
        }
    }

    /// Rebuild and re-verify against the restored identity.
    fn restore(&self, identity: &IdentityKeyPair) -> Result<SignedPrekey, CryptoError> {
        let signature: [u8; SIGNATURE_SIZE] =
            self.signature.as_slice().try_into().map_err(|_| {
                CryptoError::corrupt(format!(
                    "signed prekey {} signature is {} bytes",
                    self.id,
                    self.signature.len()
                ))
            })?;

        let keypair = KeyPair::from_secret_bytes(self.secret);
        let message = signed_prekey_message(&identity.public(), self.id, &keypair.public_key());
        identity.public().verify(&message, &signature).map_err(|_| {
            CryptoError::corrupt(format!("signed prekey {} signature does not verify", self.id))
        })?;

        Ok(SignedPrekey { id: self.id, keypair, signature })
    }
}

impl Device {
    /// Serialize the full device state, private keys included.
    pub fn export(&self) -> Vec<u8> {
        let state = DeviceState {
            version: STATE_VERSION,
            identity_signing: self.identity.signing_secret_bytes(),
            identity_dh: self.identity.dh().secret_bytes(),
            signed_prekey: self.signed_prekey.as_ref().map(SignedPrekeyState::export),
            previous_signed_prekey: self
                .previous_signed_prekey
                .as_ref()
                .map(SignedPrekeyState::export),
            one_time_prekeys: self
                .one_time_prekeys
                .iter()
                .map(|(id, keypair)| OneTimePrekeyState { id: *id, secret: keypair.secret_bytes() })
                .collect(),
            next_otk_id: self.next_otk_id,
            next_signed_prekey_id: self.next_signed_prekey_id,
            config: self.config,
        };
        encode(&state)
    }

    /// Restore a device from [`Device::export`] output.
    ///
    /// # Errors
    ///
    /// - `CorruptState`: malformed CBOR, unknown version, bad key material,
    ///   signatures that do not verify, or inconsistent id counters
    pub fn import(bytes: &[u8]) -> Result<Self, CryptoError> {
        let state: DeviceState = decode_state(bytes)?;
        check_version(state.version)?;
        state
            .config
            .validate()
            .map_err(|e| CryptoError::corrupt(format!("device limits: {e}")))?;

        let identity = IdentityKeyPair::from_secret_bytes(state.identity_signing, state.identity_dh);

        let signed_prekey =
            state.signed_prekey.as_ref().map(|prekey| prekey.restore(&identity)).transpose()?;
        let previous_signed_prekey = state
            .previous_signed_prekey
            .as_ref()
            .map(|prekey| prekey.restore(&identity))
            .transpose()?;

        match (&signed_prekey, &previous_signed_prekey) {
            (None, Some(_)) => {
                return Err(CryptoError::corrupt("previous signed prekey without a current one"));
            },
            (Some(current), Some(previous)) if previous.id >= current.id => {
                return Err(CryptoError::corrupt("previous signed prekey id not below current"));
            },
            (Some(current), _) if current.id >= state.next_signed_prekey_id => {
                return Err(CryptoError::corrupt("signed prekey id not below next id"));
            },
            _ => {},
        }

        if state.one_time_prekeys.len() > state.config.max_retained_one_time_prekeys as usize {
            return Err(CryptoError::corrupt(format!(
                "{} one-time prekeys exceed retention limit {}",
                state.one_time_prekeys.len(),
                state.config.max_retained_one_time_prekeys
            )));
        }

        let mut one_time_prekeys = std::collections::BTreeMap::new();
        let mut previous_id = None;
        for prekey in &state.one_time_prekeys {
            if previous_id.is_some_and(|previous| prekey.id <= previous) {
                return Err(CryptoError::corrupt("one-time prekey ids not strictly ascending"));
            }
            if prekey.id >= state.next_otk_id {
                return Err(CryptoError::corrupt(format!(
                    "one-time prekey {} not below next id {}",
                    prekey.id, state.next_otk_id
                )));
            }
            previous_id = Some(prekey.id);
            one_time_prekeys.insert(prekey.id, KeyPair::from_secret_bytes(prekey.secret));
        }

        Ok(Self {
            identity,
            signed_prekey,
            previous_signed_prekey,
            one_time_prekeys,
            next_otk_id: state.next_otk_id,
            next_signed_prekey_id: state.next_signed_prekey_id,
            config: state.config,
        })
    }
}

impl ChainState {
    fn export(chain: &ChainKey) -> Self {
        Self { key: *chain.key(), counter: chain.counter() }
    }

    fn restore(&self) -> ChainKey {
        ChainKey::from_parts(self.key, self.counter)
    }
}

impl Session {
    /// Serialize the full session state, including cached skipped keys.
    pub fn export(&self) -> Vec<u8> {
        let ratchet = &self.state;
        let state = SessionState {
            version: STATE_VERSION,
            root_key: ratchet.root_key,
            sending: ratchet.sending.as_ref().map(ChainState::export),
            receiving: ratchet.receiving.as_ref().map(ChainState::export),
            local_ratchet: ratchet.local_ratchet.secret_bytes(),
            remote_ratchet: ratchet.remote_ratchet,
            retired_remote_ratchets: ratchet.retired_remote_ratchets.iter().copied().collect(),
            previous_chain_length: ratchet.previous_chain_length,
            skipped: ratchet
                .skipped
                .iter()
                .map(|(ratchet_key, message_key)| SkippedKeyState {
                    ratchet_key: *ratchet_key,
                    counter: message_key.counter(),
                    key: *message_key.key(),
                })
                .collect(),
            associated_data: ratchet.associated_data.clone(),
            remote_identity: ratchet.remote_identity,
            pending_handshake: ratchet.pending_handshake.clone(),
            config: ratchet.config,
        };
        encode(&state)
    }

    /// Restore a session from [`Session::export`] output.
    ///
    /// # Errors
    ///
    /// - `CorruptState`: malformed CBOR, unknown version, incoherent limits,
    ///   missing chains, inconsistent associated data, skipped keys or
    ///   retired ratchet keys
    pub fn import(bytes: &[u8]) -> Result<Self, CryptoError> {
        let state: SessionState = decode_state(bytes)?;
        check_version(state.version)?;
        state
            .config
            .validate()
            .map_err(|e| CryptoError::corrupt(format!("session limits: {e}")))?;

        if state.sending.is_none() && state.receiving.is_none() {
            return Err(CryptoError::corrupt("session has neither sending nor receiving chain"));
        }

        if !state.remote_identity.is_well_formed() {
            return Err(CryptoError::corrupt("remote identity is not a valid key"));
        }

        let remote_identity = state.remote_identity.to_bytes();
        let binds_remote = state.associated_data.len() == 2 * remote_identity.len()
            && state.associated_data.chunks(remote_identity.len()).any(|half| half == remote_identity);
        if !binds_remote {
            return Err(CryptoError::corrupt("associated data does not bind the remote identity"));
        }

        if state.skipped.len() > state.config.max_skipped_keys as usize {
            return Err(CryptoError::corrupt(format!(
                "{} skipped keys exceed capacity {}",
                state.skipped.len(),
                state.config.max_skipped_keys
            )));
        }

        if state.retired_remote_ratchets.len() > MAX_RETIRED_RATCHET_KEYS {
            return Err(CryptoError::corrupt(format!(
                "{} retired ratchet keys exceed capacity {MAX_RETIRED_RATCHET_KEYS}",
                state.retired_remote_ratchets.len()
            )));
        }

        let mut skipped = SkippedKeys::new(state.config.max_skipped_keys as usize);
        for entry in &state.skipped {
            skipped.insert(entry.ratchet_key, MessageKey::from_parts(entry.key, entry.counter));
        }
        if skipped.len() != state.skipped.len() {
            return Err(CryptoError::corrupt("duplicate skipped key slots"));
        }

        Ok(Self {
            state: RatchetState {
                root_key: state.root_key,
                sending: state.sending.as_ref().map(ChainState::restore),
                receiving: state.receiving.as_ref().map(ChainState::restore),
                local_ratchet: KeyPair::from_secret_bytes(state.local_ratchet),
                remote_ratchet: state.remote_ratchet,
                retired_remote_ratchets: state.retired_remote_ratchets.iter().copied().collect(),
                previous_chain_length: state.previous_chain_length,
                skipped,
                associated_data: state.associated_data.clone(),
                remote_identity: state.remote_identity,
                pending_handshake: state.pending_handshake.clone(),
                config: state.config,
            },
        })
    }
}

impl PrekeyBundle {
    /// CBOR encoding for the key service.
    pub fn to_bytes(&self) -> Vec<u8> {
        encode(self)
    }

    /// Decode a bundle fetched from the key service.
    ///
    /// The signature is not checked here; [`crate::init_session`] verifies it.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest`: malformed CBOR
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        decode_wire(bytes)
    }
}

impl Envelope {
    /// CBOR encoding for the relay.
    pub fn to_bytes(&self) -> Vec<u8> {
        encode(self)
    }

    /// Decode an envelope received from the relay.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest`: malformed CBOR
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        decode_wire(bytes)
    }
}
