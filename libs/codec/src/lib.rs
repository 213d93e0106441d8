//! # Loadbench Message Codec
//!
//! Self-describing synthetic payloads. Senders build batches of random
//! records that reference the shared [`types::KeyPool`]; receivers decode
//! them, validate every record and use the embedded creation timestamp to
//! measure delivery latency.
//!
//! JSON is the wire format so payloads stay readable in backend consoles.

pub mod codec;
pub mod error;
pub mod message;
pub mod validate;

pub use codec::MessageCodec;
pub use error::{CodecError, Result};
pub use message::{
    current_timestamp_ms, Attributes, MessageBatch, MessageRecord, CURRENT_LIMIT, DELTA_LIMIT,
};
pub use validate::validate_record;
