//! # Record Codec
//!
//! Two serialized forms:
//!
//! - **Binary** ([`BinaryRecord`]): protobuf via `prost`, used for every record
//!   written to the store. Unknown fields are skipped on decode.
//! - **Text** ([`to_text`], [`from_text`], [`from_json_value`]): JSON via
//!   `serde_json`, used for queue payloads (ingress requests, DLQ outcomes).

use prost::Message;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::models::{Configuration, Event, EventOutcome, EventRequest, FiniteStateMachine};
use crate::proto::v1 as proto;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Failed to decode {record} record: {message}")]
    Decode {
        record: &'static str,
        message: String,
    },

    #[error("Timestamp out of range: {seconds}s {nanos}ns")]
    InvalidTimestamp { seconds: i64, nanos: i32 },

    #[error("Failed to encode text payload: {message}")]
    TextEncode { message: String },

    #[error("Failed to decode text payload: {message}")]
    TextDecode { message: String },
}

impl CodecError {
    pub fn decode(record: &'static str, message: impl Into<String>) -> Self {
        Self::Decode {
            record,
            message: message.into(),
        }
    }

    pub fn text_encode(message: impl Into<String>) -> Self {
        Self::TextEncode {
            message: message.into(),
        }
    }

    pub fn text_decode(message: impl Into<String>) -> Self {
        Self::TextDecode {
            message: message.into(),
        }
    }
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Binary store form of a domain record
pub trait BinaryRecord: Sized {
    /// Record name used in error messages
    const RECORD: &'static str;

    fn encode_binary(&self) -> Vec<u8>;

    fn decode_binary(bytes: &[u8]) -> CodecResult<Self>;
}

macro_rules! binary_record {
    ($domain:ty, $proto:ty, $name:literal, $convert:path) => {
        impl BinaryRecord for $domain {
            const RECORD: &'static str = $name;

            fn encode_binary(&self) -> Vec<u8> {
                <$proto>::from(self.clone()).encode_to_vec()
            }

            fn decode_binary(bytes: &[u8]) -> CodecResult<Self> {
                let message = <$proto>::decode(bytes)
                    .map_err(|e| CodecError::decode(Self::RECORD, e.to_string()))?;
                $convert(message)
            }
        }
    };
}

fn infallible<P, T: From<P>>(message: P) -> CodecResult<T> {
    Ok(T::from(message))
}

binary_record!(Configuration, proto::Configuration, "configuration", infallible);
binary_record!(FiniteStateMachine, proto::FiniteStateMachine, "fsm", TryFrom::try_from);
binary_record!(Event, proto::Event, "event", TryFrom::try_from);
binary_record!(EventOutcome, proto::EventOutcome, "outcome", infallible);
binary_record!(EventRequest, proto::EventRequest, "event_request", TryFrom::try_from);

/// Encode a record as JSON text
pub fn to_text<T: Serialize>(value: &T) -> CodecResult<String> {
    serde_json::to_string(value).map_err(|e| CodecError::text_encode(e.to_string()))
}

/// Decode a record from JSON text
pub fn from_text<T: DeserializeOwned>(text: &str) -> CodecResult<T> {
    serde_json::from_str(text).map_err(|e| CodecError::text_decode(e.to_string()))
}

/// Decode a record from a received JSON value.
///
/// Producers either post the payload as a JSON object or as a JSON string
/// holding the encoded text; both are accepted.
pub fn from_json_value<T: DeserializeOwned>(value: serde_json::Value) -> CodecResult<T> {
    match value {
        serde_json::Value::String(text) => from_text(&text),
        other => serde_json::from_value(other).map_err(|e| CodecError::text_decode(e.to_string())),
    }
}
