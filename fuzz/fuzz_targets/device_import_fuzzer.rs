//! Fuzz target for device state import
//!
//! # Strategy
//!
//! - Raw bytes straight into `Device::import`
//! - Valid exports with a single byte flipped
//!
//! # Invariants
//!
//! - Import never panics
//! - Every rejection is `CorruptState`
//! - An accepted state re-exports to bytes that import to the same device

#![no_main]

use arbitrary::Arbitrary;
use courier_crypto::{CryptoError, Device, SeededEnv};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum DeviceInput {
    Raw(Vec<u8>),
    Flipped { seed: u64, prekeys: u8, rotate: bool, index: u16, mask: u8 },
}

fuzz_target!(|input: DeviceInput| {
    let bytes = match input {
        DeviceInput::Raw(bytes) => bytes,
        DeviceInput::Flipped { seed, prekeys, rotate, index, mask } => {
            let env = SeededEnv::new(seed);
            let mut device = Device::generate(&env).unwrap();
            device.publish_prekey_bundle(u32::from(prekeys % 16), &env).unwrap();
            if rotate {
                device.rotate_signed_prekey(&env).unwrap();
            }

            let mut bytes = device.export();
            let index = usize::from(index) % bytes.len();
            bytes[index] ^= mask.max(1);
            bytes
        },
    };

    match Device::import(&bytes) {
        Ok(device) => {
            let exported = device.export();
            let restored = Device::import(&exported).expect("re-import of accepted state failed");
            assert_eq!(restored.export(), exported);
            assert_eq!(restored.identity_public(), device.identity_public());
        },
        Err(error) => {
            assert!(matches!(error, CryptoError::CorruptState { .. }), "unexpected error {error:?}");
        },
    }
});
