use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::uri::{Parts, PathAndQuery};
use http::{Method, Request, Uri};
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Frame};
use tokio::sync::Mutex;
use tokio::sync::mpsc;

use super::{Inner, Shared};
use crate::encoding::CONTENT_TYPE_MSGPACK;
use crate::http::{Auth, HttpClient, HttpError};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

// Chunks the dispatch path may buffer before writes block on the
// draining task.
const PIPE_CAPACITY: usize = 1024;

pub(super) enum ConnectionState {
    Disconnected,
    Verifying,
    Streaming(StreamConnection),
}

/// The write end of the byte pipe feeding one outbound chunked request.
///
/// Dropping it half-closes the pipe, which signals end-of-body to the
/// draining task and lets the request finish delivery.
pub(super) struct StreamConnection {
    tx: mpsc::Sender<Bytes>,
    generation: u64,
}

impl StreamConnection {
    fn open(inner: &Inner, generation: u64) -> Self {
        let (tx, rx) = mpsc::channel(PIPE_CAPACITY);

        tokio::spawn(drive_request(
            inner.stream_client.clone(),
            inner.method.clone(),
            inner.endpoint.clone(),
            inner.auth.clone(),
            ChunkedBody { rx },
            Arc::clone(&inner.shared),
            generation,
        ));

        Self { tx, generation }
    }

    /// A write handle on the pipe. Sends block while the pipe is full and
    /// fail once the draining task is gone, which the caller must treat as
    /// "no active connection".
    pub(super) fn sender(&self) -> mpsc::Sender<Bytes> {
        self.tx.clone()
    }

    pub(super) fn generation(&self) -> u64 {
        self.generation
    }
}

/// Request body fed live from the pipe as chunks become available. The
/// length is unknown up front, so hyper ships it with chunked
/// transfer-encoding.
#[derive(Debug)]
pub(super) struct ChunkedBody {
    rx: mpsc::Receiver<Bytes>,
}

impl Body for ChunkedBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        self.get_mut()
            .rx
            .poll_recv(cx)
            .map(|chunk| chunk.map(|data| Ok(Frame::data(data))))
    }
}

impl Inner {
    /// The reconnect protocol: probe when unverified, then install a fresh
    /// connection. The previous pipe's write end is dropped only after the
    /// new one is in place, so no record write hits a closed pipe in the
    /// handover window.
    pub(super) async fn reconnect(&self, shared: &mut Shared) {
        if !self.streaming || shared.closed {
            return;
        }

        if !shared.verified {
            if matches!(shared.state, ConnectionState::Disconnected) {
                shared.state = ConnectionState::Verifying;
            }

            match self.probe().await {
                Ok(()) => {
                    debug!(message = "Connection to server verified");
                    shared.verified = true;
                }
                Err(err) => {
                    debug!(message = "Connection to server not available", %err);
                    if matches!(shared.state, ConnectionState::Verifying) {
                        shared.state = ConnectionState::Disconnected;
                    }
                    return;
                }
            }
        }

        shared.generation += 1;
        let conn = StreamConnection::open(self, shared.generation);
        let old = std::mem::replace(&mut shared.state, ConnectionState::Streaming(conn));

        // close the old pipe, the draining task finishes writing buffered
        // data and completes its request
        drop(old);
    }

    /// Reachability only. Any response at all counts, application-level
    /// failures do not.
    async fn probe(&self) -> Result<(), HttpError> {
        let mut builder = Request::head(root_of(&self.endpoint));
        if let Some(auth) = &self.auth {
            builder = auth.apply_builder(builder);
        }
        let req = builder.body(Full::default())?;

        tokio::time::timeout(PROBE_TIMEOUT, self.client.send(req)).await??;

        Ok(())
    }
}

/// Owns the whole life of one outbound chunked request, from the first
/// byte until the pipe closes or the request dies.
async fn drive_request(
    client: HttpClient<ChunkedBody>,
    method: Method,
    endpoint: Uri,
    auth: Option<Auth>,
    body: ChunkedBody,
    shared: Arc<Mutex<Shared>>,
    generation: u64,
) {
    let mut builder = Request::builder()
        .method(method)
        .uri(endpoint)
        .header(CONTENT_TYPE, CONTENT_TYPE_MSGPACK);
    if let Some(auth) = &auth {
        builder = auth.apply_builder(builder);
    }
    let req = match builder.body(body) {
        Ok(req) => req,
        Err(err) => {
            error!(message = "Failed to build streaming request", %err);
            return;
        }
    };

    match client.send(req).await {
        Ok(resp) => {
            let (parts, incoming) = resp.into_parts();
            if !parts.status.is_success() {
                let body = match incoming.collect().await {
                    Ok(collected) => collected.to_bytes(),
                    Err(_) => Bytes::new(),
                };

                warn!(
                    message = "Streaming request finished with unexpected status",
                    status = %parts.status,
                    body = %String::from_utf8_lossy(&body),
                );
            }
        }
        Err(err) => {
            warn!(message = "Streaming request failed", %err);

            // the next connect must verify the endpoint again; the dispatch
            // path or the idle monitor takes care of reconnecting
            let mut shared = shared.lock().await;
            shared.verified = false;

            // a stale request must not tear down its successor
            let current = match &shared.state {
                ConnectionState::Streaming(conn) => conn.generation == generation,
                _ => false,
            };
            if current {
                shared.state = ConnectionState::Disconnected;
                shared.last_request = None;
            }
        }
    }
}

fn root_of(endpoint: &Uri) -> Uri {
    let mut parts = Parts::default();
    parts.scheme = endpoint.scheme().cloned();
    parts.authority = endpoint.authority().cloned();
    parts.path_and_query = Some(PathAndQuery::from_static("/"));

    Uri::from_parts(parts).expect("endpoint uri must be absolute")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_of_endpoint() {
        for (endpoint, want) in [
            ("http://localhost:9880/api/v1?x=1", "http://localhost:9880/"),
            ("https://example.com", "https://example.com/"),
        ] {
            let uri = endpoint.parse::<Uri>().unwrap();
            assert_eq!(root_of(&uri), want.parse::<Uri>().unwrap());
        }
    }
}
