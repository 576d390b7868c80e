//! Test doubles shared by unit tests.

use crate::error::{Error, Result};
use crate::types::UpstreamReply;
use crate::upstream::Upstream;
use axum::body::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

type ReplyFn = Box<dyn Fn() -> Result<UpstreamReply> + Send + Sync>;

/// Upstream that records every call and answers from a closure
pub struct RecordingUpstream {
    reply: ReplyFn,
    calls: AtomicUsize,
    bodies: Mutex<Vec<Bytes>>,
}

impl RecordingUpstream {
    pub fn new<F>(reply: F) -> Self
    where
        F: Fn() -> Result<UpstreamReply> + Send + Sync + 'static,
    {
        Self {
            reply: Box::new(reply),
            calls: AtomicUsize::new(0),
            bodies: Mutex::new(Vec::new()),
        }
    }

    pub fn json(body: &'static str) -> Self {
        Self::new(move || Ok(UpstreamReply::json(body)))
    }

    pub fn unreachable() -> Self {
        Self::new(|| Err(Error::UpstreamUnreachable("connection refused".into())))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_body(&self) -> Option<Bytes> {
        self.bodies.lock().unwrap().last().cloned()
    }
}

#[async_trait::async_trait]
impl Upstream for RecordingUpstream {
    async fn post_json(&self, body: Bytes) -> Result<UpstreamReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.bodies.lock().unwrap().push(body);
        (self.reply)()
    }

    fn endpoint(&self) -> &str {
        "recording://upstream"
    }
}
