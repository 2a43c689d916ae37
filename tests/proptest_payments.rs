//! Property-based tests for the payment-facing primitives.
//!
//! Uses proptest to generate arbitrary inputs and verify invariants for
//! webhook signatures, identifier validation and document storage.

use std::time::Duration;

use docgate::documents::{
    validate_document_id, DocumentKey, DocumentStore, FsDocumentStore, InMemoryDocumentStore,
};
use docgate::fulfillment::validate_session_id;
use docgate::webhook::SignatureVerifier;
use proptest::prelude::*;

// ============================================================================
// STRATEGIES
// ============================================================================

/// Strategy for document ids accepted by the service
pub fn arb_document_id() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_-]{1,64}"
}

/// Strategy for ids that must be refused as path or key components
pub fn arb_unsafe_document_id() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        Just("..".to_string()),
        "[a-z]{1,8}/[a-z]{1,8}",
        "[a-z]{1,8}\\.[a-z]{1,4}",
        "[a-z]{0,8} [a-z]{0,8}",
        "[A-Za-z0-9_-]{129,160}",
    ]
}

/// Strategy for webhook payloads
pub fn arb_payload() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..512)
}

fn verifier() -> SignatureVerifier {
    SignatureVerifier::new("whsec_prop_secret", Duration::from_secs(300))
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

// ============================================================================
// SIGNATURES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn signed_payload_verifies(payload in arb_payload(), ts in 1_600_000_000i64..1_900_000_000) {
        let v = verifier();
        let header = v.sign(&payload, ts).unwrap();
        prop_assert_eq!(v.verify_at(&payload, &header, ts).unwrap(), ts);
    }

    #[test]
    fn flipped_byte_is_rejected(
        payload in arb_payload(),
        index in any::<prop::sample::Index>(),
        mask in 1u8..=255,
    ) {
        let v = verifier();
        let ts = 1_700_000_000;
        let header = v.sign(&payload, ts).unwrap();

        let mut tampered = payload.clone();
        let i = index.index(tampered.len());
        tampered[i] ^= mask;

        prop_assert!(v.verify_at(&tampered, &header, ts).is_err());
    }

    #[test]
    fn other_secret_is_rejected(payload in arb_payload(), secret in "whsec_[a-z0-9]{8,24}") {
        prop_assume!(secret != "whsec_prop_secret");
        let ts = 1_700_000_000;
        let header = SignatureVerifier::new(secret, Duration::from_secs(300))
            .sign(&payload, ts)
            .unwrap();
        prop_assert!(verifier().verify_at(&payload, &header, ts).is_err());
    }

    #[test]
    fn skew_beyond_tolerance_is_rejected(payload in arb_payload(), skew in 301i64..86_400) {
        let v = verifier();
        let ts = 1_700_000_000;
        let header = v.sign(&payload, ts).unwrap();
        prop_assert!(v.verify_at(&payload, &header, ts + skew).is_err());
        prop_assert!(v.verify_at(&payload, &header, ts - skew).is_err());
    }

    #[test]
    fn garbage_header_never_panics(payload in arb_payload(), header in ".{0,128}") {
        prop_assert!(verifier().verify_at(&payload, &header, 1_700_000_000).is_err());
    }
}

// ============================================================================
// IDENTIFIERS
// ============================================================================

proptest! {
    #[test]
    fn safe_ids_map_to_html_keys(id in arb_document_id()) {
        let key = DocumentKey::for_document(&id).unwrap();
        let expected = format!("{id}.html");
        prop_assert_eq!(key.as_str(), expected.as_str());
    }

    #[test]
    fn unsafe_ids_are_refused(id in arb_unsafe_document_id()) {
        prop_assert!(validate_document_id(&id).is_err());
        prop_assert!(DocumentKey::for_document(&id).is_err());
    }

    #[test]
    fn session_ids_with_separators_are_refused(
        head in "[a-z]{1,8}",
        sep in prop_oneof![Just('/'), Just('.'), Just(' '), Just('-')],
        tail in "[a-z]{1,8}",
    ) {
        let separated = format!("{head}{sep}{tail}");
        let joined = format!("cs_{head}_{tail}");
        prop_assert!(validate_session_id(&separated).is_err());
        prop_assert!(validate_session_id(&joined).is_ok());
    }
}

// ============================================================================
// DOCUMENT STORAGE
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn stores_return_exact_bytes(
        id in arb_document_id(),
        bytes in prop::collection::vec(any::<u8>(), 1..2048),
    ) {
        let rt = runtime();
        let dir = tempfile::tempdir().unwrap();
        let key = DocumentKey::for_document(&id).unwrap();

        let (from_fs, from_memory) = rt.block_on(async {
            let fs = FsDocumentStore::open(dir.path()).await.unwrap();
            fs.put(&key, bytes.clone(), "application/octet-stream").await.unwrap();

            let memory = InMemoryDocumentStore::new();
            memory.put(&key, bytes.clone(), "application/octet-stream").await.unwrap();

            (fs.get(&key).await.unwrap(), memory.get(&key).await.unwrap())
        });

        prop_assert_eq!(&from_fs.bytes, &bytes);
        prop_assert_eq!(&from_fs, &from_memory);
    }
}
