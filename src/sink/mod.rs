//! The output stage of a log forwarding pipeline. Records are delivered to
//! a remote HTTP endpoint, either one by one as complete requests, or as a
//! stream of MessagePack envelopes on a single long-lived chunked request.

mod connection;
mod request;

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{Method, Uri};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tripwire::{Trigger, Tripwire};
use value::Value;

use self::connection::{ChunkedBody, ConnectionState};
use crate::config::{Config, Serializer};
use crate::encoding;
use crate::http::{Auth, HttpClient};

pub struct HttpSink {
    inner: Arc<Inner>,

    // cancelling stops the idle refresh task
    trigger: std::sync::Mutex<Option<Trigger>>,
}

impl HttpSink {
    /// Build the sink, and with streaming enabled, run the first connect
    /// cycle and spawn the idle refresh task.
    pub async fn start(config: Config) -> crate::Result<Self> {
        if config.endpoint.scheme().is_none() || config.endpoint.authority().is_none() {
            return Err("endpoint must be an absolute URI".into());
        }
        if config.streaming && config.idle_flush.is_zero() {
            return Err("idle_flush must be positive".into());
        }

        let inner = Arc::new(Inner {
            endpoint: config.endpoint,
            method: config.method,
            serializer: config.serializer,
            auth: config.auth,
            idle_flush: config.idle_flush,
            rate_limit: config.rate_limit,
            raise_on_error: config.raise_on_error,
            streaming: config.streaming,
            host: crate::hostname(),
            client: HttpClient::new()?,
            stream_client: HttpClient::new()?,
            shared: Arc::new(Mutex::new(Shared {
                state: ConnectionState::Disconnected,
                verified: false,
                last_request: None,
                generation: 0,
                closed: false,
            })),
        });

        let trigger = if inner.streaming {
            {
                let mut shared = inner.shared.lock().await;
                inner.reconnect(&mut shared).await;
            }

            let (trigger, tripwire) = Tripwire::new();
            tokio::spawn(run_idle_monitor(Arc::clone(&inner), tripwire));

            Some(trigger)
        } else {
            None
        };

        Ok(Self {
            inner,
            trigger: std::sync::Mutex::new(trigger),
        })
    }

    /// Deliver one record. May be called concurrently, dispatch is
    /// serialized through one lock.
    ///
    /// Only transport failures of request mode are ever returned, and only
    /// when `raise_on_error` is set. Everything else is absorbed and logged.
    pub async fn handle(&self, tag: &str, time: DateTime<Utc>, record: Value) -> crate::Result<()> {
        self.inner.handle(tag, time, record).await
    }

    /// Idempotent. Closing the live connection's write end lets the
    /// draining task finish on its own, nothing waits for it.
    pub async fn shutdown(&self) {
        if let Some(trigger) = self.trigger.lock().expect("lock trigger success").take() {
            trigger.cancel();
        }

        let mut shared = self.inner.shared.lock().await;
        shared.closed = true;
        shared.state = ConnectionState::Disconnected;
    }
}

pub(crate) struct Inner {
    endpoint: Uri,
    method: Method,
    serializer: Serializer,
    auth: Option<Auth>,
    idle_flush: Duration,
    rate_limit: Duration,
    raise_on_error: bool,
    streaming: bool,
    host: String,

    client: HttpClient,
    stream_client: HttpClient<ChunkedBody>,

    shared: Arc<Mutex<Shared>>,
}

pub(crate) struct Shared {
    state: ConnectionState,

    // probe result, sticky until a transport failure
    verified: bool,

    // read by both the rate limiter and the idle monitor. A rate limited
    // drop keeps it, a no-connection drop clears it.
    last_request: Option<Instant>,

    generation: u64,
    closed: bool,
}

impl Shared {
    // check-and-update is one atomic step under the dispatch lock, two
    // near-simultaneous records cannot both pass the limiter
    fn accept(&mut self, interval: Duration, now: Instant) -> bool {
        if !interval.is_zero() {
            if let Some(last) = self.last_request {
                if now.duration_since(last) < interval {
                    return false;
                }
            }
        }

        self.last_request = Some(now);
        true
    }
}

impl Inner {
    async fn handle(&self, tag: &str, time: DateTime<Utc>, record: Value) -> crate::Result<()> {
        {
            let mut shared = self.shared.lock().await;
            if !shared.accept(self.rate_limit, Instant::now()) {
                info!(message = "Dropped record due to rate limiting", tag);
                return Ok(());
            }
        }

        if self.streaming {
            self.stream_record(tag, time, record).await;
            Ok(())
        } else {
            self.dispatch_record(&record).await
        }
    }

    async fn stream_record(&self, tag: &str, time: DateTime<Utc>, record: Value) {
        let buf = encode_envelope(&self.host, tag, time, record);

        // Take a handle on the live pipe under the lock, but write outside
        // it. A write parked on a full pipe must not keep the idle monitor
        // or shutdown from closing that pipe.
        let (tx, generation) = {
            let mut shared = self.shared.lock().await;

            // heal on demand, the first record after the endpoint comes
            // back should be delivered instead of merely dropped
            if !matches!(shared.state, ConnectionState::Streaming(_)) {
                self.reconnect(&mut shared).await;
            }

            match &shared.state {
                ConnectionState::Streaming(conn) => (conn.sender(), conn.generation()),
                _ => {
                    info!(message = "Dropped record, connection not available", tag);
                    shared.last_request = None;
                    return;
                }
            }
        };

        if tx.send(buf).await.is_err() {
            // the request ended underneath us
            info!(message = "Dropped record, connection is closed", tag);

            let mut shared = self.shared.lock().await;
            shared.last_request = None;

            // only this connection is dead, a replacement may already be up
            if matches!(&shared.state, ConnectionState::Streaming(conn) if conn.generation() == generation)
            {
                shared.state = ConnectionState::Disconnected;
            }
        }
    }
}

async fn run_idle_monitor(inner: Arc<Inner>, mut shutdown: Tripwire) {
    let mut ticker = tokio::time::interval(inner.idle_flush);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
        }

        let mut shared = inner.shared.lock().await;
        let expired = match shared.last_request {
            Some(last) => last.elapsed() >= inner.idle_flush,
            None => false,
        };

        // The refresh heals a dead connection, and keeps the server from
        // timing out a connection that has gone quiet.
        if !shared.verified || expired {
            inner.reconnect(&mut shared).await;
            shared.last_request = None;
        }
    }
}

/// One complete MessagePack envelope, `[host, tag, time, record]`.
fn encode_envelope(host: &str, tag: &str, time: DateTime<Utc>, record: Value) -> Bytes {
    let record = decode_smuggled_data(record);
    let envelope = Value::Array(vec![
        Value::from(host),
        Value::from(tag),
        Value::Timestamp(time),
        record,
    ]);

    encoding::msgpack::encode(&envelope)
}

// Some consumers cannot cope with binary smuggled into a record as base64,
// so `dataBase64` is decoded into raw bytes under `data` before the
// envelope is built.
fn decode_smuggled_data(mut record: Value) -> Value {
    if let Some(map) = record.as_object_mut() {
        if let Some(smuggled) = map.remove("dataBase64") {
            match BASE64_STANDARD.decode(smuggled.to_string_lossy().as_bytes()) {
                Ok(decoded) => {
                    map.insert("data".to_string(), Value::Bytes(decoded.into()));
                }
                Err(err) => {
                    warn!(message = "Invalid base64 in dataBase64 field", %err);
                    map.insert("dataBase64".to_string(), smuggled);
                }
            }
        }
    }

    record
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn rate_limit_disabled() {
        let mut shared = Shared {
            state: ConnectionState::Disconnected,
            verified: false,
            last_request: None,
            generation: 0,
            closed: false,
        };

        for _ in 0..100 {
            assert!(shared.accept(Duration::ZERO, Instant::now()));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_interval() {
        let interval = Duration::from_millis(100);
        let mut shared = Shared {
            state: ConnectionState::Disconnected,
            verified: false,
            last_request: None,
            generation: 0,
            closed: false,
        };

        assert!(shared.accept(interval, Instant::now()));
        assert!(!shared.accept(interval, Instant::now()));

        tokio::time::advance(Duration::from_millis(50)).await;
        assert!(!shared.accept(interval, Instant::now()));

        tokio::time::advance(Duration::from_millis(50)).await;
        assert!(shared.accept(interval, Instant::now()));

        // a rejected record must not push the window forward
        tokio::time::advance(Duration::from_millis(99)).await;
        assert!(!shared.accept(interval, Instant::now()));
        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(shared.accept(interval, Instant::now()));
    }

    #[test]
    fn smuggled_data_is_decoded() {
        let mut map = BTreeMap::new();
        map.insert("dataBase64".to_string(), Value::from("aGVsbG8="));

        let record = decode_smuggled_data(Value::Object(map));

        let map = record.as_object().unwrap();
        assert!(!map.contains_key("dataBase64"));
        assert_eq!(
            map.get("data"),
            Some(&Value::Bytes(Bytes::from_static(b"hello")))
        );
    }

    #[test]
    fn smuggled_data_leaves_other_records_alone() {
        let record = decode_smuggled_data(Value::Array(vec![Value::from("dataBase64")]));
        assert_eq!(record, Value::Array(vec![Value::from("dataBase64")]));

        let mut map = BTreeMap::new();
        map.insert("data".to_string(), Value::from("plain"));
        let record = decode_smuggled_data(Value::Object(map.clone()));
        assert_eq!(record, Value::Object(map));
    }

    #[test]
    fn envelope_layout() {
        let time = DateTime::from_timestamp(1000000, 0).unwrap();
        let mut map = BTreeMap::new();
        map.insert("message".to_string(), Value::from("hi"));

        let buf = encode_envelope("host-1", "app.log", time, Value::Object(map));

        assert_eq!(
            buf.as_ref(),
            [
                0x94, // fixarray, 4 elements
                0xa6, 0x68, 0x6f, 0x73, 0x74, 0x2d, 0x31, // "host-1"
                0xa7, 0x61, 0x70, 0x70, 0x2e, 0x6c, 0x6f, 0x67, // "app.log"
                0xd6, 0xff, 0x00, 0x0f, 0x42, 0x40, // timestamp 32
                0x81, // fixmap, 1 entry
                0xa7, 0x6d, 0x65, 0x73, 0x73, 0x61, 0x67, 0x65, // "message"
                0xa2, 0x68, 0x69, // "hi"
            ]
        );
    }
}
