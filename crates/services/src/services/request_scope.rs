//! Cancellation for in-flight requests.
//!
//! A [`RequestScope`] ties requests to the lifetime of whatever issued them:
//! once the scope is closed or dropped, nothing it started can deliver a
//! result. [`LatestRequests`] keeps only the newest request per resource key
//! alive, so a slow response to an older query (search-as-you-type) can never
//! overwrite the result of a newer one.

use std::{
    collections::HashMap,
    future::Future,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::api_client::{ApiError, RequestOptions};

/// Owns the cancellation of every request issued through it
#[derive(Debug, Default)]
pub struct RequestScope {
    token: CancellationToken,
}

impl RequestScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for one request; cancelled when the scope closes
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Default options bound to this scope
    pub fn options(&self) -> RequestOptions {
        RequestOptions::default().cancel_with(self.child_token())
    }

    pub fn close(&self) {
        self.token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[derive(Debug)]
struct Slot {
    generation: u64,
    token: CancellationToken,
}

#[derive(Debug, Default)]
struct Registry {
    slots: Mutex<HashMap<String, Slot>>,
    next_generation: AtomicU64,
}

/// Latest-wins request tracking, keyed by resource
#[derive(Debug, Default, Clone)]
pub struct LatestRequests {
    registry: Arc<Registry>,
    parent: Option<CancellationToken>,
}

impl LatestRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tie every ticket to a scope as well: closing the scope cancels them all
    pub fn within(scope: &RequestScope) -> Self {
        Self {
            registry: Arc::default(),
            parent: Some(scope.child_token()),
        }
    }

    /// Register a new request for `key`, cancelling the previous one
    pub fn begin(&self, key: impl Into<String>) -> RequestTicket {
        let key = key.into();
        let generation = self.registry.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = match &self.parent {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };

        let previous = self
            .registry
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                key.clone(),
                Slot {
                    generation,
                    token: token.clone(),
                },
            );

        if let Some(previous) = previous {
            debug!(key = %key, superseded = previous.generation, "superseding in-flight request");
            previous.token.cancel();
        }

        RequestTicket {
            key,
            generation,
            token,
            registry: self.registry.clone(),
        }
    }

    /// Run `request` as the newest request for `key`.
    ///
    /// Returns `Ok(None)` when a newer request for the same key was started
    /// before this one finished; its result (or failure) is discarded.
    pub async fn run<T, F, Fut>(
        &self,
        key: impl Into<String>,
        request: F,
    ) -> Result<Option<T>, ApiError>
    where
        F: FnOnce(RequestOptions) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let ticket = self.begin(key);
        let result = request(ticket.options()).await;

        if !ticket.is_current() {
            debug!(key = %ticket.key, "discarding superseded response");
            return Ok(None);
        }

        match result {
            Ok(value) => Ok(Some(value)),
            Err(ApiError::Cancelled) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Handle to one tracked request; releases its slot when dropped
#[derive(Debug)]
pub struct RequestTicket {
    key: String,
    generation: u64,
    token: CancellationToken,
    registry: Arc<Registry>,
}

impl RequestTicket {
    /// Whether this is still the newest request for its key
    pub fn is_current(&self) -> bool {
        self.registry
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&self.key)
            .is_some_and(|slot| slot.generation == self.generation)
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn options(&self) -> RequestOptions {
        RequestOptions::default().cancel_with(self.token())
    }
}

impl Drop for RequestTicket {
    fn drop(&mut self) {
        let mut slots = self
            .registry
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slots
            .get(&self.key)
            .is_some_and(|slot| slot.generation == self.generation)
        {
            slots.remove(&self.key);
        }
    }
}
