//! Device export/import properties.

use std::collections::BTreeMap;

use courier_crypto::{
    CryptoError, Device, OneTimePrekey, PrekeyBundle, SeededEnv, accept_session, init_session,
};
use proptest::prelude::*;

/// Publish, rotate and consume operations applied to a device.
#[derive(Debug, Clone)]
enum Operation {
    Publish(u32),
    Rotate,
    Consume,
}

fn operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        (0u32..8).prop_map(Operation::Publish),
        Just(Operation::Rotate),
        Just(Operation::Consume),
    ]
}

fn apply(
    device: &mut Device,
    peer: &Device,
    published: &mut BTreeMap<u32, OneTimePrekey>,
    operation: &Operation,
    env: &SeededEnv,
) {
    match operation {
        Operation::Publish(count) => {
            let bundle = device.publish_prekey_bundle(*count, env).unwrap();
            published.extend(bundle.one_time_prekeys.iter().map(|prekey| (prekey.id, *prekey)));
        },
        Operation::Rotate => {
            device.rotate_signed_prekey(env).unwrap();
        },
        Operation::Consume => {
            let Some(id) = device.one_time_prekey_ids().first().copied() else {
                return;
            };
            let current = device.publish_prekey_bundle(0, env).unwrap();
            let bundle = PrekeyBundle { one_time_prekeys: vec![published[&id]], ..current };
            let (_, handshake) = init_session(peer, &bundle, env).unwrap();
            accept_session(device, &handshake).unwrap();
        },
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    #[test]
    fn prop_import_export_preserves_device(
        seed in any::<u64>(),
        operations in prop::collection::vec(operation(), 0..10),
    ) {
        let env = SeededEnv::new(seed);
        let mut device = Device::generate(&env).unwrap();
        let peer = Device::generate(&env).unwrap();
        let mut published = BTreeMap::new();

        for operation in &operations {
            apply(&mut device, &peer, &mut published, operation, &env);
        }

        let restored = Device::import(&device.export()).unwrap();

        prop_assert_eq!(restored.identity_public(), device.identity_public());
        prop_assert_eq!(restored.next_one_time_prekey_id(), device.next_one_time_prekey_id());
        prop_assert_eq!(restored.one_time_prekey_ids(), device.one_time_prekey_ids());
        prop_assert_eq!(restored.signed_prekey_id(), device.signed_prekey_id());
        prop_assert_eq!(restored.export(), device.export());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    #[test]
    fn prop_restored_device_issues_same_next_bundle(
        seed in any::<u64>(),
        first in 0u32..10,
        next in 1u32..10,
    ) {
        let env = SeededEnv::new(seed);
        let mut device = Device::generate(&env).unwrap();
        device.publish_prekey_bundle(first, &env).unwrap();

        let mut restored = Device::import(&device.export()).unwrap();

        let original_bundle = device.publish_prekey_bundle(next, &SeededEnv::new(seed ^ 1)).unwrap();
        let restored_bundle = restored.publish_prekey_bundle(next, &SeededEnv::new(seed ^ 1)).unwrap();

        prop_assert_eq!(original_bundle, restored_bundle);
        prop_assert_eq!(restored.next_one_time_prekey_id(), first + next);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_import_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        if let Err(error) = Device::import(&bytes) {
            let is_corrupt = matches!(error, CryptoError::CorruptState { .. });
            prop_assert!(is_corrupt);
        }
    }
}

#[test]
fn one_time_prekey_material_survives_restore() {
    let env = SeededEnv::new(3);
    let mut device = Device::generate(&env).unwrap();
    let peer = Device::generate(&env).unwrap();
    let bundle = device.publish_prekey_bundle(3, &env).unwrap();

    let mut restored = Device::import(&device.export()).unwrap();

    // A handshake against key 2 only works if its private half was restored
    let (mut outbound, handshake) =
        init_session(&peer, &bundle.for_handshake(Some(2)).unwrap(), &env).unwrap();
    let mut inbound = accept_session(&mut restored, &handshake).unwrap();

    let envelope = outbound.encrypt(b"key material intact", &env).unwrap();
    assert_eq!(inbound.decrypt(&envelope).unwrap(), b"key material intact");
    assert_eq!(restored.one_time_prekey_ids(), vec![0, 1]);
}
