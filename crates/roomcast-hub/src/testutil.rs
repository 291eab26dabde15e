//! Test doubles shared across the crate's test modules.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use roomcast_protocol::Message;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::backplane::Backplane;
use crate::error::BackplaneError;

pub(crate) type PresenceStore = Arc<Mutex<HashMap<String, i64>>>;

/// Backplane over an in-memory presence map shared between instances, with a
/// loopback pub/sub channel per instance. Stands in for Redis in tests.
pub(crate) struct SharedStoreBackplane {
    store: PresenceStore,
    tx: mpsc::Sender<Vec<Message>>,
    rx: AsyncMutex<mpsc::Receiver<Vec<Message>>>,
}

impl SharedStoreBackplane {
    pub(crate) fn new_store() -> PresenceStore {
        Arc::new(Mutex::new(HashMap::new()))
    }

    pub(crate) fn new(store: PresenceStore) -> Self {
        let (tx, rx) = mpsc::channel(32);
        Self {
            store,
            tx,
            rx: AsyncMutex::new(rx),
        }
    }
}

#[async_trait]
impl Backplane for SharedStoreBackplane {
    async fn publish(&self, batch: &[Arc<Message>]) -> Result<(), BackplaneError> {
        let owned: Vec<Message> = batch.iter().map(|msg| (**msg).clone()).collect();
        self.tx.send(owned).await.map_err(|_| BackplaneError::Closed)
    }

    async fn next_batch(&self) -> Result<Vec<Message>, BackplaneError> {
        self.rx
            .lock()
            .await
            .recv()
            .await
            .ok_or(BackplaneError::Closed)
    }

    async fn report_presence(
        &self,
        instance: &str,
        local_count: usize,
    ) -> Result<i64, BackplaneError> {
        let mut store = self.store.lock().unwrap();
        store.insert(instance.to_string(), local_count as i64);
        Ok(store.values().sum())
    }

    async fn clear_presence(&self, instance: &str) -> Result<(), BackplaneError> {
        self.store.lock().unwrap().remove(instance);
        Ok(())
    }
}
