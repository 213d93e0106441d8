//! # Codec Integration Tests
//!
//! Exercises the public codec API the way sender and receiver tasks use it:
//! encode on one side, decode + validate on the other, across key classes
//! and pools loaded from files.

use codec::{CodecError, MessageBatch, MessageCodec, MessageRecord};
use std::io::Cursor;
use std::sync::Arc;
use types::{AddressClass, KeyPool};

fn generated_codec(class: AddressClass) -> MessageCodec {
    let keys = Arc::new(KeyPool::new());
    keys.init_generated(64, class).unwrap();
    MessageCodec::new(keys).unwrap()
}

#[test]
fn test_round_trip_validates_for_every_class() {
    for class in AddressClass::ALL {
        let codec = generated_codec(class);
        let bytes = codec.encode_batch(16, None).unwrap();
        let batch = codec.decode_validated(&bytes).unwrap();

        assert_eq!(batch.count, 16);
        for record in &batch.list {
            assert!(codec.keys().keys().contains(&record.client_key));
        }
    }
}

#[test]
fn test_wire_format_field_names() {
    let codec = generated_codec(AddressClass::Any);
    let bytes = codec.encode_batch(1, None).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

    assert!(value["messages"].is_array());
    assert_eq!(value["count"], 1);
    assert!(value["ts"].is_i64());

    let record = &value["messages"][0];
    assert!(record["current"].is_u64());
    assert!(record["delta"].is_u64());
    assert!(record["clientip"].is_string());
    assert!(record.get("attributes").is_none());
}

#[test]
fn test_foreign_batch_with_bad_key_fails_validation() {
    let codec = generated_codec(AddressClass::Loopback);
    let batch = MessageBatch {
        list: vec![MessageRecord {
            current: 5,
            delta: 5,
            client_key: "10.1.1.1".to_string(),
            attributes: None,
        }],
        count: 1,
        timestamp_ms: codec::current_timestamp_ms(),
    };
    let bytes = serde_json::to_vec(&batch).unwrap();

    let err = codec.decode_validated(&bytes).unwrap_err();
    assert!(matches!(err, CodecError::Pool(_)));
    assert!(err.is_content_error());
}

#[test]
fn test_out_of_range_counter_fails_validation() {
    let codec = generated_codec(AddressClass::Any);
    let bytes = br#"{"messages":[{"current":4096,"delta":1,"clientip":"1.2.3.4"}],"count":1,"ts":1}"#;
    assert!(matches!(
        codec.decode_validated(bytes),
        Err(CodecError::Validation(_))
    ));

    let bytes = br#"{"messages":[{"current":1,"delta":64,"clientip":"1.2.3.4"}],"count":1,"ts":1}"#;
    assert!(matches!(
        codec.decode_validated(bytes),
        Err(CodecError::Validation(_))
    ));
}

#[test]
fn test_loaded_pool_codec_round_trip() {
    let keys = Arc::new(KeyPool::new());
    keys.init_from_reader(Cursor::new("10.0.0.1\n10.0.0.2\n10.0.0.3\n"))
        .unwrap();
    let codec = MessageCodec::new(keys).unwrap();

    let (bytes, key) = codec.encode_single_with_key(None).unwrap();
    assert!(key.starts_with("10.0.0."));

    let batch = codec.decode_validated(&bytes).unwrap();
    assert_eq!(batch.list[0].client_key, key);
}

#[test]
fn test_negative_counter_is_malformed() {
    let codec = generated_codec(AddressClass::Any);
    let bytes = br#"{"messages":[{"current":-1,"delta":1,"clientip":"1.2.3.4"}],"count":1,"ts":1}"#;
    assert!(matches!(
        codec.decode_batch(bytes),
        Err(CodecError::Decoding { .. })
    ));
}
