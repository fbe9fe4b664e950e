use bytes::Bytes;
use http::Request;
use http::header::CONTENT_TYPE;
use http_body_util::{BodyExt, Full};
use value::Value;

use super::Inner;
use crate::encoding;

impl Inner {
    /// One complete request per record, sent without holding the dispatch
    /// lock. Transport failures surface to the caller when `raise_on_error`
    /// is set, a response with any status is never an error.
    pub(super) async fn dispatch_record(&self, record: &Value) -> crate::Result<()> {
        let (body, content_type) = encoding::serialize(self.serializer, record);

        let mut builder = Request::builder()
            .method(self.method.clone())
            .uri(self.endpoint.clone())
            .header(CONTENT_TYPE, content_type);
        if let Some(auth) = &self.auth {
            builder = auth.apply_builder(builder);
        }
        let req = builder.body(Full::new(body))?;

        match self.client.send(req).await {
            Err(err) => {
                // force a probe before the next streaming connect
                self.shared.lock().await.verified = false;

                warn!(message = "Request failed", %err);

                if self.raise_on_error {
                    return Err(err.into());
                }
            }
            Ok(resp) => {
                let (parts, incoming) = resp.into_parts();
                if !parts.status.is_success() {
                    let body = match incoming.collect().await {
                        Ok(collected) => collected.to_bytes(),
                        Err(_) => Bytes::new(),
                    };

                    warn!(
                        message = "Response with unexpected status",
                        status = %parts.status,
                        body = %String::from_utf8_lossy(&body),
                    );
                }
            }
        }

        Ok(())
    }
}
