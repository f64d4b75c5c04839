//! Courier end-to-end encryption core
//!
//! Per-device identity and prekey management, an X3DH asynchronous
//! handshake, and a Double Ratchet producing opaque, forward-secure
//! envelopes. No I/O and no global state: callers pass in an
//! [`Environment`] for randomness and persist the bytes from
//! [`Device::export`] and [`Session::export`] wherever they like.
//!
//! # Key Lifecycle
//!
//! ```text
//! Device ──publish_prekey_bundle──► PrekeyBundle ──(key service)──┐
//!                                                                 ▼
//! Device ◄──accept_session── HandshakeMessage ◄──init_session── peer Device
//!    │                                                            │
//!    ▼                                                            ▼
//! Session ◄────────────────── Envelope ──────────────────────► Session
//! ```
//!
//! Within a session, every change of speaker performs a DH ratchet step
//! (new root key, new chain) and every message advances a symmetric chain
//! (new message key). Message keys are used once and zeroized.
//!
//! # Security
//!
//! Forward Secrecy:
//! - Chain keys are overwritten when advanced
//! - Message keys are zeroized after a single use
//! - One-time prekeys are deleted once a handshake consumes them
//!
//! Post-Compromise Security:
//! - Each DH ratchet step mixes fresh ephemeral key material into the root
//!
//! Authenticity:
//! - Signed prekeys are verified against the bundle identity (Ed25519)
//! - XChaCha20-Poly1305 authenticates the ciphertext, the header and both
//!   identities
//!
//! Failure Atomicity:
//! - Every operation that returns an error leaves its `Device` or `Session`
//!   unchanged

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod codec;
pub mod config;
pub mod env;
pub mod error;
pub mod handshake;
pub mod identity;
pub mod keys;
pub mod ratchet;

pub use config::{
    DEFAULT_BUNDLE_SIZE, DEFAULT_MAX_BUNDLE_SIZE, DEFAULT_MAX_RETAINED_ONE_TIME_PREKEYS,
    DEFAULT_MAX_SKIP, DEFAULT_MAX_SKIPPED_KEYS, DeviceConfig, RatchetConfig,
};
pub use env::{Environment, SeededEnv, SystemEnv};
pub use error::CryptoError;
pub use handshake::{HandshakeMessage, accept_session, init_session};
pub use identity::{Device, OneTimePrekey, PrekeyBundle};
pub use keys::{IdentityPublicKey, KeyPair, PublicKey};
pub use ratchet::{Envelope, Header, Session};
