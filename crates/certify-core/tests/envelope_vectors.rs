//! Envelope and challenge/response vector tests.
//!
//! Tags were produced by an independent HMAC-SHA256 implementation.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use bytes::Bytes;

use certify_core::protocol::envelope::{decode, encode};
use certify_core::protocol::lenode::{expected_response, response_matches};

use vector_loader::load;

#[test]
fn envelope_vectors() {
    let files = [
        "envelope_mud_unauthenticated.json",
        "envelope_clg_authenticated.json",
        "envelope_clg_tampered.json",
        "envelope_short_header.json",
        "envelope_short_payload.json",
    ];

    for f in files {
        let v = load(f);
        let key = v.key_bytes();
        let raw = v.frame.decode();
        let res = decode(Bytes::from(raw.clone()));

        if let Some(err) = v.expect_error {
            let e = res.expect_err("expected error");
            assert_eq!(e.kind(), err.kind, "vector={}", v.description);
            continue;
        }

        let env = res.expect("expected ok envelope");
        let ex = v.expect.expect("missing expect block");

        assert_eq!(env.header.authenticate, ex["authenticate"].as_bool().unwrap(), "vector={}", v.description);
        assert_eq!(env.header.payload_len as u64, ex["payload_len"].as_u64().unwrap(), "vector={}", v.description);
        assert_eq!(env.payload_type().unwrap() as u64, ex["payload_type"].as_u64().unwrap(), "vector={}", v.description);

        let verifies = ex["verifies"].as_bool().unwrap();
        assert_eq!(env.verify(&key), verifies, "vector={}", v.description);

        // an untampered vector must re-encode to the same bytes
        if verifies {
            let again = encode(&env.payload, env.header.authenticate, env.header.encrypt, &key).unwrap();
            assert_eq!(&again[..], &raw[..], "vector={}", v.description);
        }
    }
}

#[test]
fn response_known_answer() {
    let v = load("response_known_answer.json");
    let key = v.key_bytes();
    let challenge = v.frame.decode();
    let ex = v.expect.expect("missing expect block");
    let want = hex::decode(ex["response"].as_str().unwrap()).unwrap();

    assert_eq!(&expected_response(&key, &challenge).unwrap()[..], &want[..]);
    assert!(response_matches(&key, &challenge, &want));
    assert!(!response_matches(&key, &challenge, &want[..32]));
}
