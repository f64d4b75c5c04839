//! Courier device key management.
//!
//! Drives [`courier_crypto`] against a device state file on disk:
//!
//! - [`init`]: create a new device identity
//! - [`publish`]: mint one-time prekeys and write the bundle for the key
//!   service
//! - [`rotate`]: replace the signed prekey
//! - [`inspect`]: report fingerprint and prekey bookkeeping
//! - [`read_bundle`]: decode and verify a bundle file
//! - [`selftest`]: in-memory handshake and message exchange
//!
//! State files are replaced atomically (write to a temp file in the same
//! directory, then rename), so a crash never leaves a half-written device
//! behind. A failed write removes its temp file.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use courier_crypto::{
    CryptoError, Device, Environment, PrekeyBundle, accept_session, init_session,
};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Errors from keytool commands.
#[derive(Debug, Error)]
pub enum KeytoolError {
    /// Reading or writing a file failed
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File the operation touched
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// `init` refused to overwrite an existing device
    #[error("device state already exists at {}", path.display())]
    StateExists {
        /// Existing state file
        path: PathBuf,
    },

    /// Cryptographic core rejected the operation
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Self-test produced an unexpected result
    #[error("self-test failed: {0}")]
    Selftest(String),
}

/// Device summary reported by [`inspect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inspection {
    /// Hex SHA-256 identity fingerprint
    pub fingerprint: String,
    /// Current signed prekey id, if one was generated
    pub signed_prekey_id: Option<u32>,
    /// Id the next one-time prekey receives
    pub next_one_time_prekey_id: u32,
    /// Unconsumed one-time prekey ids
    pub one_time_prekey_ids: Vec<u32>,
}

/// Outcome of [`selftest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelftestReport {
    /// Messages exchanged and decrypted
    pub messages: usize,
    /// Whether the session survived an export/import round trip
    pub restored: bool,
}

/// Create a new device state file. Returns the identity fingerprint.
///
/// Refuses to overwrite an existing file unless `force` is set.
pub fn init(state: &Path, force: bool, env: &impl Environment) -> Result<String, KeytoolError> {
    if state.exists() && !force {
        return Err(KeytoolError::StateExists { path: state.to_path_buf() });
    }

    let device = Device::generate(env)?;
    save_device(state, &device)?;

    tracing::debug!(path = %state.display(), "Wrote new device state");
    Ok(device.fingerprint())
}

/// Mint `count` one-time prekeys, write the bundle to `out` and persist the
/// updated device.
///
/// The device file is only rewritten after the bundle was written, so a
/// failed bundle write never burns prekey ids.
pub fn publish(
    state: &Path,
    count: u32,
    out: &Path,
    env: &impl Environment,
) -> Result<PrekeyBundle, KeytoolError> {
    let mut device = load_device(state)?;
    let bundle = device.publish_prekey_bundle(count, env)?;

    write_atomic(out, &bundle.to_bytes())?;
    save_device(state, &device)?;

    Ok(bundle)
}

/// Rotate the signed prekey, optionally writing the re-publication bundle.
pub fn rotate(
    state: &Path,
    out: Option<&Path>,
    env: &impl Environment,
) -> Result<PrekeyBundle, KeytoolError> {
    let mut device = load_device(state)?;
    let bundle = device.rotate_signed_prekey(env)?;

    if let Some(out) = out {
        write_atomic(out, &bundle.to_bytes())?;
    }
    save_device(state, &device)?;

    Ok(bundle)
}

/// Summarize a device state file.
pub fn inspect(state: &Path) -> Result<Inspection, KeytoolError> {
    let device = load_device(state)?;
    Ok(Inspection {
        fingerprint: device.fingerprint(),
        signed_prekey_id: device.signed_prekey_id(),
        next_one_time_prekey_id: device.next_one_time_prekey_id(),
        one_time_prekey_ids: device.one_time_prekey_ids(),
    })
}

/// Read and validate a bundle file, e.g. one fetched from the key service.
pub fn read_bundle(path: &Path) -> Result<PrekeyBundle, KeytoolError> {
    let bytes = read(path)?;
    let bundle = PrekeyBundle::from_bytes(&bytes)?;
    bundle.verify_signature()?;
    Ok(bundle)
}

/// Run a handshake and a short conversation between two fresh in-memory
/// devices, including a session export/import in the middle.
pub fn selftest(env: &impl Environment) -> Result<SelftestReport, KeytoolError> {
    let initiator = Device::generate(env)?;
    let mut responder = Device::generate(env)?;

    let bundle = responder.publish_prekey_bundle(1, env)?;
    let (mut outbound, handshake) = init_session(&initiator, &bundle, env)?;

    let first = outbound.encrypt(b"selftest: hello", env)?;
    let mut inbound = accept_session(&mut responder, &handshake)?;
    expect_plaintext(&inbound.decrypt(&first)?, b"selftest: hello")?;

    let reply = inbound.encrypt(b"selftest: reply", env)?;
    expect_plaintext(&outbound.decrypt(&reply)?, b"selftest: reply")?;

    let mut inbound = courier_crypto::Session::import(&inbound.export())?;
    let after_restore = outbound.encrypt(b"selftest: after restore", env)?;
    expect_plaintext(&inbound.decrypt(&after_restore)?, b"selftest: after restore")?;

    if responder.has_one_time_prekey(0) {
        return Err(KeytoolError::Selftest("one-time prekey 0 was not consumed".to_string()));
    }

    match inbound.decrypt(&after_restore) {
        Err(CryptoError::DuplicateOrUnknownMessage { .. }) => {},
        other => {
            return Err(KeytoolError::Selftest(format!("replay was not rejected: {other:?}")));
        },
    }

    Ok(SelftestReport { messages: 3, restored: true })
}

fn expect_plaintext(actual: &[u8], expected: &[u8]) -> Result<(), KeytoolError> {
    if actual != expected {
        return Err(KeytoolError::Selftest(format!(
            "decrypted {} bytes, expected {:?}",
            actual.len(),
            String::from_utf8_lossy(expected)
        )));
    }
    Ok(())
}

fn load_device(path: &Path) -> Result<Device, KeytoolError> {
    let bytes = read(path)?;
    Ok(Device::import(&bytes)?)
}

fn save_device(path: &Path, device: &Device) -> Result<(), KeytoolError> {
    write_atomic(path, &device.export())
}

fn read(path: &Path) -> Result<Vec<u8>, KeytoolError> {
    fs::read(path).map_err(|source| KeytoolError::Io { path: path.to_path_buf(), source })
}

/// Write `bytes` to a temp file next to `path`, sync it, then rename over
/// `path`. The temp file is deleted on every error path.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), KeytoolError> {
    let io_error = |source: io::Error| KeytoolError::Io { path: path.to_path_buf(), source };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir).map_err(io_error)?;
    file.write_all(bytes).map_err(io_error)?;
    file.as_file().sync_all().map_err(io_error)?;
    file.persist(path).map_err(|e| io_error(e.error))?;

    Ok(())
}
