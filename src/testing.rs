//! Test doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::net::{Request, Response, Transport};

/// Scripted transport: fixed responses per `METHOD URL`, with an offline switch.
#[derive(Default)]
pub struct FakeTransport {
  routes: Mutex<HashMap<String, Response>>,
  offline: AtomicBool,
  sent: AtomicUsize,
  log: Mutex<Vec<String>>,
}

impl FakeTransport {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn route(&self, method: &str, url: &str, response: Response) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(format!("{} {}", method, url), response);
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  /// Requests that reached the transport, including failed ones.
  pub fn sent(&self) -> usize {
    self.sent.load(Ordering::SeqCst)
  }

  pub fn requests(&self) -> Vec<String> {
    self.log.lock().unwrap().clone()
  }
}

impl Transport for FakeTransport {
  async fn send(&self, request: &Request) -> Result<Response> {
    let key = format!("{} {}", request.method, request.url);
    self.sent.fetch_add(1, Ordering::SeqCst);
    self.log.lock().unwrap().push(key.clone());

    if self.offline.load(Ordering::SeqCst) {
      return Err(Error::Network("connection refused".to_string()));
    }

    self
      .routes
      .lock()
      .unwrap()
      .get(&key)
      .cloned()
      .ok_or_else(|| Error::Network(format!("no route for {}", key)))
  }
}
