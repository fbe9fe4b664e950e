use std::time::Duration;

use http::{Method, Uri};
use serde::Deserialize;

use crate::http::Auth;

pub const fn default_true() -> bool {
    true
}

const fn default_idle_flush() -> Duration {
    Duration::from_secs(15)
}

const fn default_rate_limit() -> Duration {
    Duration::ZERO
}

fn default_method() -> Method {
    Method::POST
}

/// Wire format used to serialize records in request mode.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Serializer {
    Json,
    Form,
    #[default]
    Msgpack,
}

impl<'de> Deserialize<'de> for Serializer {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // any unrecognized value degrades to the simplest format
        let kind = String::deserialize(deserializer)?;
        Ok(match kind.as_str() {
            "json" => Serializer::Json,
            "msgpack" => Serializer::Msgpack,
            _ => Serializer::Form,
        })
    }
}

pub mod uri {
    use std::fmt;

    use http::Uri;
    use serde::de::{Unexpected, Visitor};
    use serde::{Deserializer, de};

    struct UriVisitor;

    impl Visitor<'_> for UriVisitor {
        type Value = Uri;

        #[inline]
        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("uri")
        }

        fn visit_str<E: de::Error>(self, val: &str) -> Result<Self::Value, E> {
            val.parse()
                .map_err(|_| de::Error::invalid_value(Unexpected::Str(val), &self))
        }

        fn visit_string<E: de::Error>(self, val: String) -> Result<Self::Value, E> {
            val.try_into().map_err(de::Error::custom)
        }
    }

    #[inline]
    pub fn deserialize<'de, D>(de: D) -> Result<Uri, D::Error>
    where
        D: Deserializer<'de>,
    {
        de.deserialize_str(UriVisitor)
    }
}

pub mod http_method {
    use http::Method;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Method, D::Error>
    where
        D: Deserializer<'de>,
    {
        // anything outside the supported set degrades to POST
        let method = String::deserialize(deserializer)?;
        Ok(match method.to_lowercase().as_str() {
            "get" => Method::GET,
            "put" => Method::PUT,
            "delete" => Method::DELETE,
            _ => Method::POST,
        })
    }
}

/// Configuration for the http streaming output.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// The full URI to make HTTP requests to.
    #[serde(with = "uri")]
    pub endpoint: Uri,

    /// The HTTP method used for each outbound request.
    #[serde(default = "default_method", with = "http_method")]
    pub method: Method,

    /// How long an accepted record may age before a quiet streaming
    /// connection is refreshed.
    #[serde(default = "default_idle_flush", with = "humanize::duration::serde")]
    pub idle_flush: Duration,

    /// Wire format for request mode. Streaming mode always ships MessagePack.
    #[serde(default)]
    pub serializer: Serializer,

    /// Records arriving within this interval of the previously accepted one
    /// are dropped. Zero disables rate limiting.
    #[serde(default = "default_rate_limit", with = "humanize::duration::serde")]
    pub rate_limit: Duration,

    /// Propagate request mode transport failures to the caller.
    #[serde(default = "default_true")]
    pub raise_on_error: bool,

    /// Http auth
    pub auth: Option<Auth>,

    /// Deliver records over one long-lived chunked request instead of one
    /// complete request per record.
    #[serde(default)]
    pub streaming: bool,
}
