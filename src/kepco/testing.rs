//! Recording transport for unit tests.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;

use super::transport::{RemoteRequest, Transport};
use crate::error::LookupResult;

type Reply = dyn Fn(&RemoteRequest) -> LookupResult<Value> + Send + Sync;

/// Answers every request with `reply` and remembers what was sent.
pub struct FakeTransport {
    reply: Box<Reply>,
    calls: Mutex<Vec<RemoteRequest>>,
}

impl FakeTransport {
    pub fn replying<F>(reply: F) -> Self
    where
        F: Fn(&RemoteRequest) -> LookupResult<Value> + Send + Sync + 'static,
    {
        Self {
            reply: Box::new(reply),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RemoteRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn post(&self, request: &RemoteRequest) -> LookupResult<Value> {
        self.calls.lock().unwrap().push(request.clone());
        (self.reply)(request)
    }
}
