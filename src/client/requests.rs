//! Client request tracking
//!
//! Generates request ids, parks a oneshot per outstanding request, and hands
//! each response to the caller waiting on its id.

use std::collections::HashMap;
use std::sync::atomic::{ AtomicI64, Ordering };

use serde_json::Value;
use tokio::sync::{ Mutex, oneshot };
use tracing::{ debug, warn };

use crate::errors::Error;
use crate::messages::{ RequestId, Response };

type Waiter = oneshot::Sender<Result<Value, Error>>;

#[derive(Default)]
struct Pending {
    waiters: HashMap<RequestId, Waiter>,
    /// Set once the connection is gone; new requests fail with it
    closed: Option<String>,
}

/// Correlates responses with the requests that caused them
pub struct RequestManager {
    next_id: AtomicI64,
    pending: Mutex<Pending>,
}

impl RequestManager {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            pending: Mutex::new(Pending::default()),
        }
    }

    /// Next unused request id
    pub fn next_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Park a waiter for `id`; fails once the connection has closed
    pub async fn register(&self, id: RequestId) -> Result<oneshot::Receiver<Result<Value, Error>>, Error> {
        let mut pending = self.pending.lock().await;
        if let Some(reason) = &pending.closed {
            return Err(Error::SessionClosed(reason.clone()));
        }
        let (tx, rx) = oneshot::channel();
        pending.waiters.insert(id, tx);
        Ok(rx)
    }

    /// Deliver a response; returns false when nobody was waiting for it
    pub async fn complete(&self, response: Response) -> bool {
        let waiter = self.pending.lock().await.waiters.remove(&response.id);
        match waiter {
            Some(waiter) => {
                debug!("Completing request {}", response.id);
                if waiter.send(response.into_result()).is_err() {
                    debug!("Caller stopped waiting before the response arrived");
                }
                true
            }
            None => {
                warn!("Received response for unknown request id {}", response.id);
                false
            }
        }
    }

    /// Stop waiting for `id`, e.g. after a timeout
    pub async fn forget(&self, id: &RequestId) -> bool {
        self.pending.lock().await.waiters.remove(id).is_some()
    }

    /// Fail every outstanding request and refuse new ones
    pub async fn fail_all(&self, reason: &str) {
        let mut pending = self.pending.lock().await;
        if pending.closed.is_none() {
            pending.closed = Some(reason.to_string());
        }
        for (id, waiter) in pending.waiters.drain() {
            if waiter.send(Err(Error::SessionClosed(reason.to_string()))).is_err() {
                debug!("Request {} was abandoned before the session closed", id);
            }
        }
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.waiters.len()
    }

    pub async fn is_closed(&self) -> bool {
        self.pending.lock().await.closed.is_some()
    }
}

impl Default for RequestManager {
    fn default() -> Self {
        Self::new()
    }
}
