//! Secondary asset sources consulted on a local miss.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError};
use fsa_config::{log_fallback_debug, log_fallback_warn};
use fsa_index::Asset;
use tracing::field::display;
use uuid::Uuid;

/// Anything that can answer "give me asset X" when the local store cannot.
pub trait FallbackService: Send + Sync {
    fn get(&self, id: &Uuid) -> Option<Asset>;

    /// Short label used in logs.
    fn name(&self) -> &str {
        "fallback"
    }
}

/// Wraps a [`FallbackService`] with an optional deadline.
#[derive(Clone)]
pub struct FallbackResolver {
    service: Arc<dyn FallbackService>,
    timeout: Option<Duration>,
}

impl FallbackResolver {
    pub fn new(service: Arc<dyn FallbackService>, timeout: Option<Duration>) -> Self {
        Self { service, timeout }
    }

    pub fn name(&self) -> &str {
        self.service.name()
    }

    /// Ask the fallback for `id`.
    ///
    /// With a timeout configured the call runs on its own thread and a late
    /// answer is dropped. The returned asset always carries `id`.
    pub fn fetch(&self, id: &Uuid) -> Option<Asset> {
        let mut asset = match self.timeout {
            None => self.service.get(id),
            Some(timeout) => self.fetch_with_timeout(id, timeout),
        }?;
        if asset.metadata.id != *id {
            log_fallback_debug!(
                "Fallback returned a different ID; rewriting",
                requested = display(id),
                returned = display(&asset.metadata.id),
            );
            asset.metadata.id = *id;
        }
        Some(asset)
    }

    fn fetch_with_timeout(&self, id: &Uuid, timeout: Duration) -> Option<Asset> {
        let (tx, rx) = bounded(1);
        let service = Arc::clone(&self.service);
        let requested = *id;
        let spawned = thread::Builder::new()
            .name("fsa-fallback".to_string())
            .spawn(move || {
                // The receiver is gone if we already timed out.
                let _ = tx.send(service.get(&requested));
            });
        if let Err(e) = spawned {
            log_fallback_warn!("Failed to spawn fallback request", error = display(&e));
            return None;
        }

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                log_fallback_warn!(
                    "Fallback request timed out",
                    service = self.service.name(),
                    id = display(id),
                    timeout_ms = timeout.as_millis() as u64,
                );
                None
            }
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}
