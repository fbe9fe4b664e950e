use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::Formatter;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::{Error, MapAccess, SeqAccess};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::Value;

impl Value {
    /// Converts self into a String representation, using JSON for Map/Array.
    ///
    /// # Panics
    ///
    /// If map or array serialization fails.
    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        match self {
            Value::Bytes(b) => String::from_utf8_lossy(b),
            Value::Float(f) => f.to_string().into(),
            Value::Integer(i) => i.to_string().into(),
            Value::Boolean(b) => if *b { "true" } else { "false" }.into(),
            Value::Timestamp(ts) => timestamp_to_string(ts).into(),
            Value::Object(map) => serde_json::to_string(map)
                .expect("Cannot serialize map")
                .into(),
            Value::Array(arr) => serde_json::to_string(arr)
                .expect("Cannot serialize array")
                .into(),
            Value::Null => "<null>".into(),
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Bytes(b) => serializer.serialize_str(String::from_utf8_lossy(b).as_ref()),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Boolean(b) => serializer.serialize_bool(*b),
            Value::Timestamp(ts) => serializer.serialize_str(&timestamp_to_string(ts)),
            Value::Object(o) => serializer.collect_map(o),
            Value::Array(a) => serializer.collect_seq(a),
            Value::Null => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ValueVisitor;

        impl<'de> serde::de::Visitor<'de> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
                formatter.write_str("any valid JSON value")
            }

            #[inline]
            fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E>
            where
                E: Error,
            {
                Ok(v.into())
            }

            #[inline]
            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: Error,
            {
                Ok(v.into())
            }

            #[inline]
            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: Error,
            {
                Ok((v as i64).into())
            }

            #[inline]
            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: Error,
            {
                Ok(Value::Float(v))
            }

            #[inline]
            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: Error,
            {
                let b = Bytes::copy_from_slice(v.as_bytes());
                Ok(Value::Bytes(b))
            }

            #[inline]
            fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
            where
                E: Error,
            {
                Ok(v.into())
            }

            #[inline]
            fn visit_none<E>(self) -> Result<Self::Value, E>
            where
                E: Error,
            {
                Ok(Value::Null)
            }

            #[inline]
            fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
            where
                D: Deserializer<'de>,
            {
                Deserialize::deserialize(deserializer)
            }

            #[inline]
            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: Error,
            {
                Ok(Value::Null)
            }

            #[inline]
            fn visit_seq<A>(self, mut visitor: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let mut vec = Vec::new();
                while let Some(value) = visitor.next_element()? {
                    vec.push(value);
                }

                Ok(Value::Array(vec))
            }

            fn visit_map<A>(self, mut visitor: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut map = BTreeMap::new();
                while let Some((key, value)) = visitor.next_entry()? {
                    map.insert(key, value);
                }

                Ok(Value::Object(map))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}

fn timestamp_to_string(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip() {
        let input = r#"{"active":true,"count":3,"message":"foo bar","ratio":0.25,"tags":["a","b"]}"#;

        let value: Value = serde_json::from_str(input).unwrap();
        assert_eq!(
            value.as_object().unwrap().get("count"),
            Some(&Value::Integer(3))
        );

        let output = serde_json::to_string(&value).unwrap();
        assert_eq!(input, output);
    }

    #[test]
    fn lossy_string() {
        let mut map = BTreeMap::new();
        map.insert("key".to_string(), Value::from("value"));

        for (value, want) in [
            (Value::from("text"), "text"),
            (Value::Integer(7), "7"),
            (Value::Boolean(false), "false"),
            (Value::Null, "<null>"),
            (Value::Object(map), r#"{"key":"value"}"#),
        ] {
            assert_eq!(value.to_string_lossy(), want);
        }
    }
}
