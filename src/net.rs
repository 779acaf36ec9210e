//! HTTP request/response types and the transport seam used by the cache tier.

use std::future::Future;

use reqwest::Method;
use serde::{de::DeserializeOwned, Serialize};
use url::Url;

use crate::cache::RequestIdentity;
use crate::error::{Error, Result};

/// An outgoing request.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub body: Option<Vec<u8>>,
}

impl Request {
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::GET,
      url,
      body: None,
    }
  }

  /// POST with a JSON body.
  pub fn post_json(url: Url, body: &impl Serialize) -> Result<Self> {
    Ok(Self {
      method: Method::POST,
      url,
      body: Some(serde_json::to_vec(body)?),
    })
  }

  /// Only read-only requests are ever written to the response cache.
  pub fn is_read_only(&self) -> bool {
    self.method == Method::GET
  }

  pub fn identity(&self) -> RequestIdentity {
    RequestIdentity::new(self.method.as_str(), self.url.as_str())
  }
}

/// A response obtained from the network or replayed from the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: Vec::new(),
      body: body.into(),
    }
  }

  pub fn json_body(status: u16, value: &serde_json::Value) -> Self {
    Self {
      status,
      headers: vec![("content-type".to_string(), "application/json".to_string())],
      body: value.to_string().into_bytes(),
    }
  }

  /// 2xx
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
    Ok(serde_json::from_slice(&self.body)?)
  }

  /// Convert a non-2xx response into `Error::Server`.
  ///
  /// The backend reports failures as `{"error": "..."}`; anything else falls back
  /// to the status line.
  pub fn error_for_status(self) -> Result<Self> {
    if self.is_success() {
      return Ok(self);
    }
    let message = serde_json::from_slice::<serde_json::Value>(&self.body)
      .ok()
      .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
      .unwrap_or_else(|| format!("HTTP {}", self.status));
    Err(Error::Server {
      status: self.status,
      message,
    })
  }
}

/// Something that can put a request on the wire.
///
/// `Err(Error::Network)` means no response was obtained. Error statuses are
/// returned as `Ok(Response)`.
pub trait Transport: Send + Sync {
  fn send(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send;
}

/// reqwest-backed transport.
#[derive(Clone, Default)]
pub struct HttpTransport {
  client: reqwest::Client,
}

impl HttpTransport {
  pub fn new() -> Self {
    Self::default()
  }
}

impl Transport for HttpTransport {
  async fn send(&self, request: &Request) -> Result<Response> {
    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone());
    if let Some(body) = &request.body {
      builder = builder
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(body.clone());
    }

    let response = builder.send().await?;
    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();
    let body = response.bytes().await?.to_vec();

    Ok(Response {
      status,
      headers,
      body,
    })
  }
}
