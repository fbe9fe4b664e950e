//! Only the encode half of MessagePack is needed, and it's small enough
//! to implement directly.
//!
//! SPEC: https://github.com/msgpack/msgpack/blob/master/spec.md

use bytes::Bytes;
use chrono::{DateTime, Utc};
use value::Value;

/// Encode a value into one self-describing MessagePack unit.
pub fn encode(value: &Value) -> Bytes {
    let mut buf = Vec::new();
    encode_value(&mut buf, value);

    Bytes::from(buf)
}

fn encode_value(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Null => buf.push(0xc0),
        Value::Boolean(b) => buf.push(if *b { 0xc3 } else { 0xc2 }),
        Value::Integer(i) => encode_int(buf, *i),
        Value::Float(f) => {
            buf.push(0xcb);
            buf.extend_from_slice(&f.to_be_bytes());
        }
        Value::Bytes(b) => match std::str::from_utf8(b) {
            Ok(s) => encode_str(buf, s),
            Err(_) => encode_bin(buf, b),
        },
        Value::Timestamp(ts) => encode_timestamp(buf, ts),
        Value::Array(array) => {
            let len = array.len();
            if len < 16 {
                buf.push(0x90 | len as u8);
            } else if len <= u16::MAX as usize {
                buf.push(0xdc);
                buf.extend_from_slice(&(len as u16).to_be_bytes());
            } else {
                buf.push(0xdd);
                buf.extend_from_slice(&(len as u32).to_be_bytes());
            }

            for item in array {
                encode_value(buf, item);
            }
        }
        Value::Object(map) => {
            let len = map.len();
            if len < 16 {
                buf.push(0x80 | len as u8);
            } else if len <= u16::MAX as usize {
                buf.push(0xde);
                buf.extend_from_slice(&(len as u16).to_be_bytes());
            } else {
                buf.push(0xdf);
                buf.extend_from_slice(&(len as u32).to_be_bytes());
            }

            for (key, value) in map {
                encode_str(buf, key);
                encode_value(buf, value);
            }
        }
    }
}

// The smallest representation wins, e.g. 3 is a single byte.
fn encode_int(buf: &mut Vec<u8>, value: i64) {
    if (0..=0x7f).contains(&value) {
        // positive fixint
        buf.push(value as u8);
    } else if (-32..0).contains(&value) {
        // negative fixint
        buf.push(value as u8);
    } else if value > 0 {
        if value <= u8::MAX as i64 {
            buf.push(0xcc);
            buf.push(value as u8);
        } else if value <= u16::MAX as i64 {
            buf.push(0xcd);
            buf.extend_from_slice(&(value as u16).to_be_bytes());
        } else if value <= u32::MAX as i64 {
            buf.push(0xce);
            buf.extend_from_slice(&(value as u32).to_be_bytes());
        } else {
            buf.push(0xcf);
            buf.extend_from_slice(&(value as u64).to_be_bytes());
        }
    } else if value >= i8::MIN as i64 {
        buf.push(0xd0);
        buf.push(value as i8 as u8);
    } else if value >= i16::MIN as i64 {
        buf.push(0xd1);
        buf.extend_from_slice(&(value as i16).to_be_bytes());
    } else if value >= i32::MIN as i64 {
        buf.push(0xd2);
        buf.extend_from_slice(&(value as i32).to_be_bytes());
    } else {
        buf.push(0xd3);
        buf.extend_from_slice(&value.to_be_bytes());
    }
}

fn encode_str(buf: &mut Vec<u8>, value: &str) {
    let len = value.len();
    if len < 32 {
        // fixstr
        buf.push(0xa0 | len as u8);
    } else if len <= u8::MAX as usize {
        buf.push(0xd9);
        buf.push(len as u8);
    } else if len <= u16::MAX as usize {
        buf.push(0xda);
        buf.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        buf.push(0xdb);
        buf.extend_from_slice(&(len as u32).to_be_bytes());
    }

    buf.extend_from_slice(value.as_bytes());
}

fn encode_bin(buf: &mut Vec<u8>, value: &[u8]) {
    let len = value.len();
    if len <= u8::MAX as usize {
        buf.push(0xc4);
        buf.push(len as u8);
    } else if len <= u16::MAX as usize {
        buf.push(0xc5);
        buf.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        buf.push(0xc6);
        buf.extend_from_slice(&(len as u32).to_be_bytes());
    }

    buf.extend_from_slice(value);
}

// https://github.com/msgpack/msgpack/blob/master/spec.md#timestamp-extension-type
fn encode_timestamp(buf: &mut Vec<u8>, ts: &DateTime<Utc>) {
    let secs = ts.timestamp();
    let nanos = ts.timestamp_subsec_nanos();

    if nanos == 0 && (0..=u32::MAX as i64).contains(&secs) {
        // timestamp 32
        buf.push(0xd6);
        buf.push(0xff);
        buf.extend_from_slice(&(secs as u32).to_be_bytes());
    } else if (0..1i64 << 34).contains(&secs) {
        // timestamp 64
        let payload = ((nanos as u64) << 34) | secs as u64;
        buf.push(0xd7);
        buf.push(0xff);
        buf.extend_from_slice(&payload.to_be_bytes());
    } else {
        // timestamp 96
        buf.push(0xc7);
        buf.push(12);
        buf.push(0xff);
        buf.extend_from_slice(&nanos.to_be_bytes());
        buf.extend_from_slice(&secs.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn integers() {
        for (input, want) in [
            (0i64, vec![0x00]),
            (1, vec![0x01]),
            (127, vec![0x7f]),
            (-1, vec![0xff]),
            (-32, vec![0xe0]),
            (128, vec![0xcc, 0x80]),
            (255, vec![0xcc, 0xff]),
            (256, vec![0xcd, 0x01, 0x00]),
            (65535, vec![0xcd, 0xff, 0xff]),
            (65536, vec![0xce, 0x00, 0x01, 0x00, 0x00]),
            (
                4294967296,
                vec![0xcf, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00],
            ),
            (-33, vec![0xd0, 0xdf]),
            (-128, vec![0xd0, 0x80]),
            (-129, vec![0xd1, 0xff, 0x7f]),
            (-32768, vec![0xd1, 0x80, 0x00]),
            (-32769, vec![0xd2, 0xff, 0xff, 0x7f, 0xff]),
            (
                i64::MIN,
                vec![0xd3, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
            ),
        ] {
            assert_eq!(
                encode(&Value::Integer(input)).as_ref(),
                want,
                "input: {input}"
            );
        }
    }

    #[test]
    fn scalars() {
        assert_eq!(encode(&Value::Null).as_ref(), [0xc0]);
        assert_eq!(encode(&Value::Boolean(false)).as_ref(), [0xc2]);
        assert_eq!(encode(&Value::Boolean(true)).as_ref(), [0xc3]);
        assert_eq!(
            encode(&Value::Float(0.5)).as_ref(),
            [0xcb, 0x3f, 0xe0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
        assert_eq!(
            encode(&Value::Float(f64::NEG_INFINITY)).as_ref(),
            [0xcb, 0xff, 0xf0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn strings() {
        assert_eq!(
            encode(&Value::from("foo bar")).as_ref(),
            [0xa7, 0x66, 0x6f, 0x6f, 0x20, 0x62, 0x61, 0x72]
        );

        // utf8 stays a string
        assert_eq!(
            encode(&Value::from("€")).as_ref(),
            [0xa3, 0xe2, 0x82, 0xac]
        );

        let long = "B123456789012345678901234567890E";
        let mut want = vec![0xd9, 0x20];
        want.extend_from_slice(long.as_bytes());
        assert_eq!(encode(&Value::from(long)).as_ref(), want);
    }

    #[test]
    fn binary() {
        // invalid utf8 must survive as bin, not str
        let input = Bytes::from(vec![0xff, 0xfe, 0x00, 0x01]);
        assert_eq!(
            encode(&Value::Bytes(input)).as_ref(),
            [0xc4, 0x04, 0xff, 0xfe, 0x00, 0x01]
        );
    }

    #[test]
    fn timestamps() {
        let ts = DateTime::<Utc>::from_timestamp(1000000, 0).unwrap();
        assert_eq!(
            encode(&Value::Timestamp(ts)).as_ref(),
            [0xd6, 0xff, 0x00, 0x0f, 0x42, 0x40]
        );

        let ts = DateTime::<Utc>::from_timestamp(1, 1).unwrap();
        assert_eq!(
            encode(&Value::Timestamp(ts)).as_ref(),
            [0xd7, 0xff, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x01]
        );

        let ts = DateTime::<Utc>::from_timestamp(-1, 0).unwrap();
        assert_eq!(
            encode(&Value::Timestamp(ts)).as_ref(),
            [
                0xc7, 0x0c, 0xff, // ext8, 12 bytes
                0x00, 0x00, 0x00, 0x00, // nanos
                0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, // secs
            ]
        );
    }

    #[test]
    fn containers() {
        assert_eq!(
            encode(&Value::Array(vec![
                Value::from("foo"),
                Value::from("bar")
            ]))
            .as_ref(),
            [0x92, 0xa3, 0x66, 0x6f, 0x6f, 0xa3, 0x62, 0x61, 0x72]
        );

        let mut map = BTreeMap::new();
        map.insert("baz".to_string(), Value::Float(0.5));
        map.insert("foo".to_string(), Value::Integer(1));
        assert_eq!(
            encode(&Value::Object(map)).as_ref(),
            [
                0x82, // fixmap, 2 entries
                0xa3, 0x62, 0x61, 0x7a, // "baz"
                0xcb, 0x3f, 0xe0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // 0.5
                0xa3, 0x66, 0x6f, 0x6f, // "foo"
                0x01, // 1
            ]
        );

        let array = Value::Array((0..16).map(Value::Integer).collect());
        let mut want = vec![0xdc, 0x00, 0x10];
        want.extend(0..16u8);
        assert_eq!(encode(&array).as_ref(), want);
    }
}
