use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use roomcast_protocol::{decode_batch, encode_batch, Message};
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::error::BackplaneError;

/// Redis hash holding one field per live instance: instance name → local
/// connection count. Entries from crashed instances are not expired.
pub const PRESENCE_KEY: &str = "roomcast:online-count";

/// Bridge between one hub and whatever keeps multiple instances logically
/// consistent: a batched publish/subscribe channel plus the shared presence
/// counter.
///
/// The publishing instance receives its own batches back through
/// `next_batch`, so local and remote messages take the same fan-out path.
#[async_trait]
pub trait Backplane: Send + Sync {
    /// Serialize the whole batch as one payload and publish it once.
    async fn publish(&self, batch: &[Arc<Message>]) -> Result<(), BackplaneError>;

    /// Await the next published payload and decode it.
    async fn next_batch(&self) -> Result<Vec<Message>, BackplaneError>;

    /// Record this instance's local count and return the cluster-wide total,
    /// in one atomic read-modify-write.
    async fn report_presence(&self, instance: &str, local_count: usize)
        -> Result<i64, BackplaneError>;

    /// Remove this instance's presence entry.
    async fn clear_presence(&self, instance: &str) -> Result<(), BackplaneError>;

    /// Tear down the subscription.
    async fn close(&self) {}
}

/// Redis-backed backplane for clustered deployments: pub/sub keyed by the
/// room's channel name, presence via an atomic pipeline against
/// [`PRESENCE_KEY`].
pub struct RedisBackplane {
    channel: String,
    conn: ConnectionManager,
    pubsub: AsyncMutex<Option<redis::aio::PubSub>>,
}

impl RedisBackplane {
    /// Connect and subscribe to `channel`.
    pub async fn connect(url: &str, channel: &str) -> Result<Self, BackplaneError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;
        Ok(Self {
            channel: channel.to_string(),
            conn,
            pubsub: AsyncMutex::new(Some(pubsub)),
        })
    }
}

#[async_trait]
impl Backplane for RedisBackplane {
    async fn publish(&self, batch: &[Arc<Message>]) -> Result<(), BackplaneError> {
        let payload = encode_batch(batch)?;
        let mut conn = self.conn.clone();
        let _subscribers: i64 = conn.publish(&self.channel, payload).await?;
        Ok(())
    }

    async fn next_batch(&self) -> Result<Vec<Message>, BackplaneError> {
        let mut guard = self.pubsub.lock().await;
        let Some(pubsub) = guard.as_mut() else {
            return Err(BackplaneError::Closed);
        };
        let received = pubsub
            .on_message()
            .next()
            .await
            .ok_or(BackplaneError::Closed)?;
        let payload: String = received.get_payload()?;
        Ok(decode_batch(&payload)?)
    }

    async fn report_presence(
        &self,
        instance: &str,
        local_count: usize,
    ) -> Result<i64, BackplaneError> {
        let mut conn = self.conn.clone();
        // HSET + HVALS in one MULTI/EXEC round trip so concurrent instances
        // never observe each other's writes torn
        let (counts,): (Vec<i64>,) = redis::pipe()
            .atomic()
            .hset(PRESENCE_KEY, instance, local_count as i64)
            .ignore()
            .hvals(PRESENCE_KEY)
            .query_async(&mut conn)
            .await?;
        Ok(counts.iter().sum())
    }

    async fn clear_presence(&self, instance: &str) -> Result<(), BackplaneError> {
        let mut conn = self.conn.clone();
        let _removed: i64 = conn.hdel(PRESENCE_KEY, instance).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pubsub.lock().await.take();
    }
}

/// Standalone backplane: publishes loop straight back to the subscriber side
/// in-process, and presence is just the local count. Lets a single-process
/// deployment run the exact same hub code with no Redis.
pub struct LoopbackBackplane {
    tx: mpsc::Sender<Vec<Message>>,
    rx: AsyncMutex<mpsc::Receiver<Vec<Message>>>,
}

impl LoopbackBackplane {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: AsyncMutex::new(rx),
        }
    }
}

#[async_trait]
impl Backplane for LoopbackBackplane {
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
        _instance: &str,
        local_count: usize,
    ) -> Result<i64, BackplaneError> {
        Ok(local_count as i64)
    }

    async fn clear_presence(&self, _instance: &str) -> Result<(), BackplaneError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::SharedStoreBackplane;

    #[tokio::test]
    async fn loopback_round_trips_batches_in_order() {
        let bp = LoopbackBackplane::new(8);
        let batch: Vec<Arc<Message>> = vec![
            Arc::new(Message::chat("alice", "one")),
            Arc::new(Message::chat("alice", "two")),
        ];

        bp.publish(&batch).await.unwrap();
        let received = bp.next_batch().await.unwrap();

        assert_eq!(received.len(), 2);
        assert_eq!(received[0].payload.chat.as_ref().unwrap().content, "one");
        assert_eq!(received[1].payload.chat.as_ref().unwrap().content, "two");
    }

    #[tokio::test]
    async fn loopback_presence_is_local_count() {
        let bp = LoopbackBackplane::new(8);
        assert_eq!(bp.report_presence("any", 7).await.unwrap(), 7);
        bp.clear_presence("any").await.unwrap();
    }

    #[tokio::test]
    async fn shared_store_sums_across_instances() {
        let store = SharedStoreBackplane::new_store();
        let node_a = SharedStoreBackplane::new(Arc::clone(&store));
        let node_b = SharedStoreBackplane::new(Arc::clone(&store));

        assert_eq!(node_a.report_presence("a", 3).await.unwrap(), 3);
        assert_eq!(node_b.report_presence("b", 5).await.unwrap(), 8);
        // a's next tick now also sees the cluster total
        assert_eq!(node_a.report_presence("a", 3).await.unwrap(), 8);

        node_b.clear_presence("b").await.unwrap();
        assert_eq!(node_a.report_presence("a", 3).await.unwrap(), 3);
    }
}
