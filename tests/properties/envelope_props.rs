use std::sync::OnceLock;

use proptest::prelude::*;

use otaup::OtaError;
use otaup::crypto::{decode, encode};
use otaup::keys::{KeyPair, KeyStrategy, create_key_pair};

fn pair() -> &'static KeyPair {
    static PAIR: OnceLock<KeyPair> = OnceLock::new();
    PAIR.get_or_init(|| create_key_pair(1024).unwrap())
}

fn arb_strategy() -> impl Strategy<Value = KeyStrategy> {
    prop_oneof![
        Just(KeyStrategy::PrivateDecrypt),
        Just(KeyStrategy::PublicDecrypt),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn encode_then_decode_restores_archive(
        archive in prop::collection::vec(any::<u8>(), 0..4096),
        strategy in arb_strategy(),
    ) {
        let keys = pair();
        let envelope = encode(&archive, keys.of_kind(strategy.encode_kind()), strategy).unwrap();
        let decoded = decode(
            &envelope.payload,
            &envelope.session_key_wrapped,
            keys.of_kind(strategy.decode_kind()),
            strategy,
        )
        .unwrap();
        prop_assert_eq!(decoded, archive);
    }

    #[test]
    fn every_encode_uses_a_fresh_session_key(
        archive in prop::collection::vec(any::<u8>(), 1..256),
        strategy in arb_strategy(),
    ) {
        let key = pair().of_kind(strategy.encode_kind());
        let first = encode(&archive, key, strategy).unwrap();
        let second = encode(&archive, key, strategy).unwrap();
        prop_assert_ne!(first.session_key_wrapped, second.session_key_wrapped);
        prop_assert_ne!(first.payload, second.payload);
    }

    #[test]
    fn flipped_payload_byte_is_rejected(
        archive in prop::collection::vec(any::<u8>(), 1..512),
        index in any::<prop::sample::Index>(),
    ) {
        let strategy = KeyStrategy::PrivateDecrypt;
        let keys = pair();
        let mut envelope = encode(&archive, &keys.public, strategy).unwrap();
        let at = index.index(envelope.payload.len());
        envelope.payload[at] ^= 0x01;

        let result = decode(&envelope.payload, &envelope.session_key_wrapped, &keys.private, strategy);
        prop_assert!(matches!(result, Err(OtaError::DecryptionFailed(_))));
    }
}
