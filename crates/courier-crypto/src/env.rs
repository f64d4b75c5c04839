//! Entropy abstraction for deterministic testing.
//!
//! Every key the core generates is drawn from an [`Environment`] supplied by
//! the caller. Production code uses [`SystemEnv`] (OS RNG via getrandom);
//! tests and simulations use [`SeededEnv`], which replays the same byte
//! stream for the same seed.

use std::sync::{Mutex, PoisonError};

use rand_chacha::{
    ChaCha20Rng,
    rand_core::{RngCore, SeedableRng},
};

use crate::error::CryptoError;

/// Source of randomness for key generation.
///
/// # Invariants
///
/// - Production implementations MUST use cryptographically secure entropy
/// - Given the same seed, deterministic implementations produce the same
///   sequence of bytes
pub trait Environment {
    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]) -> Result<(), CryptoError>;

    /// Random fixed-size array, for key seeds.
    fn random_array<const N: usize>(&self) -> Result<[u8; N], CryptoError> {
        let mut bytes = [0u8; N];
        self.random_bytes(&mut bytes)?;
        Ok(bytes)
    }
}

/// Production environment backed by the OS cryptographic RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn random_bytes(&self, buffer: &mut [u8]) -> Result<(), CryptoError> {
        getrandom::fill(buffer).map_err(|e| CryptoError::Entropy { reason: e.to_string() })
    }
}

/// Deterministic environment driven by a seeded ChaCha20 stream.
///
/// NOT for production keys: anyone who knows the seed knows every key.
pub struct SeededEnv {
    rng: Mutex<ChaCha20Rng>,
}

impl SeededEnv {
    /// Environment whose byte stream is fully determined by `seed`.
    pub fn new(seed: u64) -> Self {
        Self { rng: Mutex::new(ChaCha20Rng::seed_from_u64(seed)) }
    }
}

impl Environment for SeededEnv {
    fn random_bytes(&self, buffer: &mut [u8]) -> Result<(), CryptoError> {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(buffer);
        Ok(())
    }
}

impl std::fmt::Debug for SeededEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SeededEnv")
    }
}
