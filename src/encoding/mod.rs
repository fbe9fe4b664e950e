pub mod msgpack;

use bytes::Bytes;
use value::Value;

use crate::config::Serializer;

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_MSGPACK: &str = "application/x-msgpack";
pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";

/// Serialize a record into a request body and its content type.
///
/// Serialization of well-formed records always succeeds, there is no error
/// path here. A non-mapping record handed to the form serializer yields an
/// empty body.
pub fn serialize(kind: Serializer, record: &Value) -> (Bytes, &'static str) {
    match kind {
        Serializer::Json => {
            let buf = serde_json::to_vec(record).expect("Cannot serialize record");

            (buf.into(), CONTENT_TYPE_JSON)
        }
        Serializer::Msgpack => (msgpack::encode(record), CONTENT_TYPE_MSGPACK),
        Serializer::Form => (form_encode(record), CONTENT_TYPE_FORM),
    }
}

// Flat `key=value&...` pairs. Nested values degrade to their JSON text,
// this format is lossy for anything but a flat string keyed mapping.
fn form_encode(record: &Value) -> Bytes {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());

    if let Some(map) = record.as_object() {
        for (key, value) in map {
            serializer.append_pair(key, &value.to_string_lossy());
        }
    }

    Bytes::from(serializer.finish())
}
