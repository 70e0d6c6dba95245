//! Request descriptors handed to the engine by the transport.

use std::fmt;
use std::str::FromStr;

use cachewarden_core::cache::url::{UrlError, resolve};
use cachewarden_core::{Error, RequestKey};
use serde::{Deserialize, Serialize};
use url::Url;

/// What kind of resource the request is for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Document,
    Style,
    Script,
    Image,
    #[default]
    Other,
}

impl Destination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Destination::Document => "document",
            Destination::Style => "style",
            Destination::Script => "script",
            Destination::Image => "image",
            Destination::Other => "other",
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Destination {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "document" => Ok(Destination::Document),
            "style" => Ok(Destination::Style),
            "script" => Ok(Destination::Script),
            "image" => Ok(Destination::Image),
            "" | "other" => Ok(Destination::Other),
            other => Err(Error::InvalidInput(format!("unknown destination: {other}"))),
        }
    }
}

/// An outbound request as seen by the engine.
///
/// Only used to pick a strategy and to talk to the network; cache identity
/// comes from [`RequestDescriptor::key`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub method: String,
    pub url: Url,
    pub destination: Destination,
}

impl RequestDescriptor {
    pub fn new(method: impl Into<String>, url: Url, destination: Destination) -> Self {
        Self { method: method.into(), url, destination }
    }

    /// Parse a GET request, resolving relative URLs against `base`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUrl` for unparseable input or non-http(s) schemes.
    pub fn get(input: &str, base: &Url, destination: Destination) -> Result<Self, Error> {
        let url = resolve(input, base).map_err(|e: UrlError| Error::InvalidUrl(e.to_string()))?;
        Ok(Self::new("GET", url, destination))
    }

    /// Whether the engine handles this request at all.
    ///
    /// Non-GET methods and non-network schemes pass through untouched.
    pub fn is_interceptable(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET") && matches!(self.url.scheme(), "http" | "https")
    }

    /// Cache identity of this request.
    pub fn key(&self) -> Result<RequestKey, Error> {
        RequestKey::new(&self.method, self.url.as_str())
    }

    /// Whether the request targets `origin` (same scheme, host and port).
    pub fn is_same_origin(&self, origin: &Url) -> bool {
        self.url.origin() == origin.origin()
    }
}
