//! JSON-over-HTTP key-value store client
//!
//! Talks to a realtime-database style REST endpoint where every record lives
//! at `{base}/{collection}/{key}.json`. Subscriptions are served by polling
//! each collection and broadcasting whenever its contents change.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::util::rate_limit::WriteLimiter;

use super::{Collection, SharedStore, StoreSnapshot};

struct Feed {
    latest: RwLock<StoreSnapshot>,
    changes: broadcast::Sender<StoreSnapshot>,
}

impl Feed {
    fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            latest: RwLock::new(Arc::new(HashMap::new())),
            changes,
        }
    }
}

/// HTTP side of the store: URL layout and the three requests it issues
#[derive(Clone)]
struct Endpoint {
    client: Client,
    base_url: String,
}

impl Endpoint {
    /// URL of a whole collection
    fn collection_url(&self, collection: Collection) -> String {
        format!("{}/{}.json", self.base_url, collection.path())
    }

    /// URL of a single record
    fn record_url(&self, collection: Collection, key: &str) -> String {
        format!("{}/{}/{}.json", self.base_url, collection.path(), key)
    }

    /// Fetch the full contents of a collection
    async fn fetch(&self, collection: Collection) -> Result<HashMap<String, Value>, StoreError> {
        let response = self
            .client
            .get(self.collection_url(collection))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(StoreError::Request)?;
        let response = check_status(response, false).await?;

        // An empty collection comes back as `null`
        let records: Option<HashMap<String, Value>> =
            response.json().await.map_err(StoreError::Parse)?;
        Ok(records.unwrap_or_default())
    }

    /// Write a record (insert or overwrite)
    async fn write(&self, collection: Collection, key: &str, value: &Value) -> Result<(), StoreError> {
        let response = self
            .client
            .put(self.record_url(collection, key))
            .header("Content-Type", "application/json")
            .json(value)
            .send()
            .await
            .map_err(StoreError::Request)?;
        check_status(response, false).await?;
        Ok(())
    }

    /// Delete a record; deleting a missing record succeeds
    async fn delete(&self, collection: Collection, key: &str) -> Result<(), StoreError> {
        let response = self
            .client
            .delete(self.record_url(collection, key))
            .send()
            .await
            .map_err(StoreError::Request)?;
        check_status(response, true).await?;
        Ok(())
    }
}

/// Whether a response status counts as success. `missing_ok` accepts 404.
fn status_accepted(status: StatusCode, missing_ok: bool) -> bool {
    status.is_success() || (missing_ok && status == StatusCode::NOT_FOUND)
}

async fn check_status(response: Response, missing_ok: bool) -> Result<Response, StoreError> {
    let status = response.status();
    if status_accepted(status, missing_ok) {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Api { status: status.as_u16(), body })
}

/// REST store client. Cheap to share behind an `Arc`.
pub struct RestStore {
    endpoint: Endpoint,
    write_limiter: WriteLimiter,
    feeds: [Feed; 3],
}

impl RestStore {
    /// Create the client and start one poller per collection. Pollers stop
    /// once the last `Arc` to the store is dropped.
    pub fn connect(base_url: impl Into<String>, poll_interval: Duration) -> Arc<Self> {
        let store = Arc::new(Self {
            endpoint: Endpoint {
                client: Client::new(),
                base_url: base_url.into().trim_end_matches('/').to_string(),
            },
            write_limiter: WriteLimiter::default(),
            feeds: [Feed::new(), Feed::new(), Feed::new()],
        });

        for collection in Collection::ALL {
            tokio::spawn(poll_collection(Arc::downgrade(&store), collection, poll_interval));
        }

        store
    }

    fn feed(&self, collection: Collection) -> &Feed {
        &self.feeds[collection.index()]
    }
}

impl SharedStore for RestStore {
    fn put(&self, collection: Collection, key: &str, value: Value) {
        if !self.write_limiter.check() {
            debug!(collection = collection.path(), key, "Write rate limited, dropped");
            return;
        }

        let endpoint = self.endpoint.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            if let Err(e) = endpoint.write(collection, &key, &value).await {
                warn!(collection = collection.path(), key = %key, error = %e, "Store write failed");
            }
        });
    }

    fn remove(&self, collection: Collection, key: &str) {
        let endpoint = self.endpoint.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            if let Err(e) = endpoint.delete(collection, &key).await {
                warn!(collection = collection.path(), key = %key, error = %e, "Store delete failed");
            }
        });
    }

    fn snapshot(&self, collection: Collection) -> StoreSnapshot {
        self.feed(collection).latest.read().clone()
    }

    fn subscribe(&self, collection: Collection) -> broadcast::Receiver<StoreSnapshot> {
        self.feed(collection).changes.subscribe()
    }
}

/// Poll one collection until the store goes away
async fn poll_collection(store: Weak<RestStore>, collection: Collection, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let Some(store) = store.upgrade() else {
            debug!(collection = collection.path(), "Store dropped, poller exiting");
            return;
        };

        match store.endpoint.fetch(collection).await {
            Ok(records) => {
                let feed = store.feed(collection);
                if **feed.latest.read() == records {
                    continue;
                }
                let snapshot: StoreSnapshot = Arc::new(records);
                *feed.latest.write() = snapshot.clone();
                let _ = feed.changes.send(snapshot);
            }
            Err(e) => {
                // Transient: the next poll heals it
                warn!(collection = collection.path(), error = %e, "Store poll failed");
            }
        }
    }
}

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    Parse(#[source] reqwest::Error),
}
