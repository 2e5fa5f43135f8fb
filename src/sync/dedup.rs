//! Collapses concurrent reads of the same session into one store call.

use crate::store::DocumentStore;
use crate::types::SessionEntity;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

type SharedRead = Shared<BoxFuture<'static, Option<SessionEntity>>>;

/// Reads sessions by identity, sharing one in-flight read per identity.
///
/// The in-flight entry is removed as soon as the read settles, whatever its
/// outcome, so a later call always goes back to the store.
#[derive(Clone)]
pub struct RequestDeduplicator {
    store: Arc<dyn DocumentStore>,
    collection: String,
    in_flight: Arc<Mutex<HashMap<String, SharedRead>>>,
}

impl RequestDeduplicator {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Fetch the session with identity `id`. Store failures are logged and
    /// reported as `None`.
    pub async fn get_by_identity(&self, id: &str) -> Option<SessionEntity> {
        let read = {
            let mut in_flight = self.in_flight.lock().await;
            match in_flight.get(id) {
                Some(existing) => {
                    debug!("Joining in-flight read for {}", id);
                    existing.clone()
                }
                None => {
                    let read = self.start_read(id.to_string());
                    in_flight.insert(id.to_string(), read.clone());
                    read
                }
            }
        };
        read.await
    }

    /// Number of reads currently outstanding
    pub async fn in_flight_count(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    fn start_read(&self, id: String) -> SharedRead {
        let store = self.store.clone();
        let collection = self.collection.clone();
        let in_flight = self.in_flight.clone();

        async move {
            let result = store.query(&collection, json!({ "key": id }), 1).await;
            in_flight.lock().await.remove(&id);

            match result {
                Ok(page) => match page.list.into_iter().next() {
                    Some(document) => match serde_json::from_value::<SessionEntity>(document) {
                        Ok(entity) => Some(entity),
                        Err(e) => {
                            warn!("Stored session {} is malformed: {}", id, e);
                            None
                        }
                    },
                    None => None,
                },
                Err(e) => {
                    warn!("Failed to read session {}: {}", id, e);
                    None
                }
            }
        }
        .boxed()
        .shared()
    }
}
