use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use roomcast_core::config::HubConfig;
use roomcast_protocol::Message;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backplane::Backplane;
use crate::connection::{ClientHandle, ConnectionId};
use crate::error::HubClosed;
use crate::presence;

/// One unit of fan-out work: deliver one message to one connection.
/// Consumed exactly once by a worker.
struct Job {
    client: Arc<ClientHandle>,
    msg: Arc<Message>,
}

struct HubQueues {
    broadcast_rx: mpsc::Receiver<Arc<Message>>,
    publish_rx: mpsc::Receiver<Arc<Message>>,
}

/// One chat room within one process: the registry of live connections and the
/// fan-out engine. Clustered instances sharing a backplane channel act as one
/// logical room; standalone deployments get the same type wired with a
/// loopback backplane.
pub struct Hub {
    pub(crate) cfg: HubConfig,
    /// Membership only; each connection's serve loop drives its own teardown
    /// and removes itself here. All mutation goes through this one mutex.
    clients: Mutex<HashMap<ConnectionId, Arc<ClientHandle>>>,
    broadcast_tx: mpsc::Sender<Arc<Message>>,
    publish_tx: mpsc::Sender<Arc<Message>>,
    queues: Mutex<Option<HubQueues>>,
    pub(crate) backplane: Box<dyn Backplane>,
    done: CancellationToken,
}

impl Hub {
    pub fn new(cfg: HubConfig, backplane: Box<dyn Backplane>) -> Arc<Self> {
        let (broadcast_tx, broadcast_rx) = mpsc::channel(cfg.queue_size);
        let (publish_tx, publish_rx) = mpsc::channel(cfg.queue_size);
        Arc::new(Self {
            cfg,
            clients: Mutex::new(HashMap::new()),
            broadcast_tx,
            publish_tx,
            queues: Mutex::new(Some(HubQueues {
                broadcast_rx,
                publish_rx,
            })),
            backplane,
            done: CancellationToken::new(),
        })
    }

    /// Instance name; doubles as this process's presence-map field.
    pub fn name(&self) -> &str {
        &self.cfg.name
    }

    pub fn join(&self, client: Arc<ClientHandle>) {
        self.clients.lock().unwrap().insert(client.id(), client);
    }

    /// Idempotent: leaving an absent connection is a no-op.
    pub fn leave(&self, id: ConnectionId) {
        self.clients.lock().unwrap().remove(&id);
    }

    pub fn member_count(&self) -> usize {
        self.clients.lock().unwrap().len()
    }

    /// Hand an inbound message to the publish path. Awaits queue space, so a
    /// backed-up publish queue throttles the publishing connection's read
    /// task rather than dropping.
    pub async fn publish(&self, msg: Arc<Message>) -> Result<(), HubClosed> {
        self.publish_tx.send(msg).await.map_err(|_| HubClosed)
    }

    /// Enqueue for local fan-out. Used by the backplane inbound path and the
    /// presence aggregator.
    pub async fn broadcast(&self, msg: Arc<Message>) -> Result<(), HubClosed> {
        self.broadcast_tx.send(msg).await.map_err(|_| HubClosed)
    }

    /// Signal every hub task to exit. Safe to call more than once.
    pub fn shutdown(&self) {
        self.done.cancel();
    }

    pub(crate) fn done(&self) -> &CancellationToken {
        &self.done
    }

    /// The hub's main loop: starts the backplane subscriber, the presence
    /// aggregator, and the fan-out dispatcher with its worker pool, then owns
    /// the publish-flush timer until shutdown.
    pub async fn run(self: Arc<Self>) {
        let queues = self.queues.lock().unwrap().take();
        let Some(HubQueues {
            broadcast_rx,
            mut publish_rx,
        }) = queues
        else {
            warn!(hub = %self.cfg.name, "hub run() called twice, ignoring");
            return;
        };

        let hub = Arc::clone(&self);
        tokio::spawn(async move { hub.subscriber_loop().await });

        let hub = Arc::clone(&self);
        tokio::spawn(presence::run(hub));

        // Fixed worker pool: the dispatcher hands (connection, message) jobs
        // to workers so one slow connection blocks a worker, not the
        // dispatcher.
        let pool_size = 3 * self.cfg.queue_size;
        let (job_tx, job_rx) = mpsc::channel::<Job>(pool_size);
        let job_rx = Arc::new(AsyncMutex::new(job_rx));
        for _ in 0..pool_size {
            let job_rx = Arc::clone(&job_rx);
            let done = self.done.clone();
            tokio::spawn(worker_loop(job_rx, done));
        }

        let hub = Arc::clone(&self);
        tokio::spawn(async move { hub.dispatch_loop(broadcast_rx, job_tx).await });

        info!(hub = %self.cfg.name, channel = %self.cfg.channel, "hub running");

        let mut flush = interval(Duration::from_millis(self.cfg.pub_flush_ms));
        flush.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut batch: Vec<Arc<Message>> = Vec::with_capacity(self.cfg.max_pub_per_flush);

        loop {
            tokio::select! {
                _ = self.done.cancelled() => break,

                _ = flush.tick() => {
                    batch.clear();
                    while batch.len() < self.cfg.max_pub_per_flush {
                        match publish_rx.try_recv() {
                            Ok(msg) => batch.push(msg),
                            Err(_) => break,
                        }
                    }
                    if batch.is_empty() {
                        continue;
                    }
                    if let Err(e) = self.backplane.publish(&batch).await {
                        warn!(hub = %self.cfg.name, error = %e, "backplane publish failed");
                    }
                }
            }
        }

        self.backplane.close().await;
        if let Err(e) = self.backplane.clear_presence(&self.cfg.name).await {
            warn!(hub = %self.cfg.name, error = %e, "presence cleanup failed");
        }
        info!(hub = %self.cfg.name, "hub stopped");
    }

    /// Backplane inbound path: every received batch, our own included, goes
    /// through the same local broadcast queue. Transient failures are logged
    /// and the loop keeps going.
    async fn subscriber_loop(&self) {
        loop {
            tokio::select! {
                _ = self.done.cancelled() => return,

                received = self.backplane.next_batch() => match received {
                    Ok(batch) => {
                        for msg in batch {
                            if self.broadcast_tx.send(Arc::new(msg)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(crate::error::BackplaneError::Closed) => return,
                    Err(e) => {
                        warn!(hub = %self.cfg.name, error = %e, "backplane receive failed");
                    }
                },
            }
        }
    }

    /// Fan-out dispatcher: one job per (member, message). The membership
    /// snapshot is taken under the mutex; a connection joining or leaving
    /// mid-broadcast may or may not see that message, which is fine.
    async fn dispatch_loop(
        &self,
        mut broadcast_rx: mpsc::Receiver<Arc<Message>>,
        job_tx: mpsc::Sender<Job>,
    ) {
        loop {
            let msg = tokio::select! {
                _ = self.done.cancelled() => return,
                msg = broadcast_rx.recv() => match msg {
                    Some(msg) => msg,
                    None => return,
                },
            };

            let targets: Vec<Arc<ClientHandle>> =
                self.clients.lock().unwrap().values().cloned().collect();
            for client in targets {
                let job = Job {
                    client,
                    msg: Arc::clone(&msg),
                };
                if job_tx.send(job).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Workers share one job queue; the receiver lock is held only across the
/// dequeue, so a worker stuck in a slow `enqueue` never stalls the others.
async fn worker_loop(job_rx: Arc<AsyncMutex<mpsc::Receiver<Job>>>, done: CancellationToken) {
    loop {
        let job = tokio::select! {
            _ = done.cancelled() => return,
            job = async { job_rx.lock().await.recv().await } => match job {
                Some(job) => job,
                None => return,
            },
        };
        if job.client.enqueue(job.msg).await.is_err() {
            // connection already tearing down; its serve loop handles removal
            debug!(conn_id = %job.client.id(), "enqueue to closed connection skipped");
        }
    }
}
