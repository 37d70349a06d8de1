//! TTL cache for rendered results, with single-flight rendering.
//!
//! Concurrent requests for the same key share one render: the first caller
//! becomes the leader, later callers wait on a watch channel for its
//! outcome. A failed render is never cached; waiters see the failure and the
//! next caller renders fresh.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use kaggleingest_shared::{IngestError, IngestRequest, Result};

type RenderOutcome = std::result::Result<Arc<String>, String>;

enum Slot {
    Ready {
        content: Arc<String>,
        created: Instant,
    },
    InFlight(watch::Receiver<Option<RenderOutcome>>),
}

/// Cache of rendered outputs keyed by request identity.
pub struct RenderCache {
    ttl: Duration,
    slots: Mutex<HashMap<String, Slot>>,
}

/// Cache key for a request: same resource, count, and format share a render.
pub fn cache_key(request: &IngestRequest) -> String {
    format!(
        "{}:{}:{}",
        request.resource, request.top_n, request.format
    )
}

impl RenderCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached render for `key`, or run `render` to produce it.
    ///
    /// Expiry is checked on read, so a stale entry is replaced even if the
    /// background sweeper has not run yet. A leader whose future is dropped
    /// mid-render leaves a dead in-flight slot; the first follower to notice
    /// clears it and the key re-renders on the next pass.
    pub async fn get_or_render<F, Fut>(&self, key: &str, render: F) -> Result<Arc<String>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        let mut render = Some(render);
        loop {
            let role = {
                let mut slots = self.slots.lock().await;

                let expired = matches!(
                    slots.get(key),
                    Some(Slot::Ready { created, .. }) if created.elapsed() >= self.ttl
                );
                if expired {
                    debug!(key, "cache entry expired");
                    slots.remove(key);
                }

                match slots.get(key) {
                    Some(Slot::Ready { content, .. }) => {
                        debug!(key, "cache hit");
                        return Ok(content.clone());
                    }
                    Some(Slot::InFlight(rx)) => SlotRole::Follower(rx.clone()),
                    None => {
                        let (tx, rx) = watch::channel(None);
                        slots.insert(key.to_string(), Slot::InFlight(rx));
                        SlotRole::Leader(tx)
                    }
                }
            };

            let tx = match role {
                SlotRole::Leader(tx) => tx,
                SlotRole::Follower(mut rx) => {
                    debug!(key, "waiting on in-flight render");
                    let published = loop {
                        if let Some(outcome) = rx.borrow_and_update().clone() {
                            break Some(outcome);
                        }
                        if rx.changed().await.is_err() {
                            break None;
                        }
                    };
                    match published {
                        Some(Ok(content)) => return Ok(content),
                        Some(Err(msg)) => return Err(IngestError::Render(msg)),
                        None => {
                            // Leader dropped without publishing. Clear the
                            // dead slot unless someone already replaced it,
                            // then retry from the top.
                            let mut slots = self.slots.lock().await;
                            if let Some(Slot::InFlight(stored)) = slots.get(key) {
                                if stored.same_channel(&rx) {
                                    debug!(key, "clearing abandoned in-flight slot");
                                    slots.remove(key);
                                }
                            }
                            continue;
                        }
                    }
                }
            };

            // One leader election per call: the closure is present here.
            let Some(render) = render.take() else {
                return Err(IngestError::Render(
                    "render callback consumed twice".into(),
                ));
            };
            let outcome = render().await;
            let mut slots = self.slots.lock().await;
            return match outcome {
                Ok(content) => {
                    let content = Arc::new(content);
                    slots.insert(
                        key.to_string(),
                        Slot::Ready {
                            content: content.clone(),
                            created: Instant::now(),
                        },
                    );
                    let _ = tx.send(Some(Ok(content.clone())));
                    Ok(content)
                }
                Err(e) => {
                    slots.remove(key);
                    let _ = tx.send(Some(Err(e.to_string())));
                    Err(e)
                }
            };
        }
    }

    /// Drop expired entries and abandoned in-flight slots. Returns how many
    /// were removed.
    pub async fn sweep(&self) -> usize {
        let mut slots = self.slots.lock().await;
        let before = slots.len();
        slots.retain(|_, slot| match slot {
            Slot::Ready { created, .. } => created.elapsed() < self.ttl,
            // A closed channel means the leader is gone without publishing.
            Slot::InFlight(rx) => rx.has_changed().is_ok(),
        });
        let removed = before - slots.len();
        if removed > 0 {
            info!(removed, remaining = slots.len(), "cache sweep");
        }
        removed
    }

    /// Number of live entries, in-flight included.
    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Spawn the periodic sweeper. Stops when `cancel` fires.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        self.sweep().await;
                    }
                }
            }
        })
    }
}

/// Role taken by a caller for one key: the leader renders, followers wait.
enum SlotRole {
    Leader(watch::Sender<Option<RenderOutcome>>),
    Follower(watch::Receiver<Option<RenderOutcome>>),
}
