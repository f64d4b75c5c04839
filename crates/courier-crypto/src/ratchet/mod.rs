//! Double Ratchet: DH ratchet over a root chain, symmetric sending and
//! receiving chains, AEAD message protection and a bounded skipped-key cache
//! for out-of-order delivery.

pub(crate) mod aead;
pub(crate) mod chain;
pub(crate) mod envelope;
pub(crate) mod kdf;
pub(crate) mod session;
pub(crate) mod skipped;

pub use envelope::{Envelope, Header};
pub use session::Session;
