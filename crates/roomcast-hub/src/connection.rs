use std::sync::{Arc, Mutex};
use std::time::Duration;

use roomcast_core::config::ConnectionConfig;
use roomcast_protocol::Message;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ConnectionError;
use crate::hub::Hub;
use crate::transport::{Frame, TransportReader, TransportWriter};

pub type ConnectionId = Uuid;

/// The hub-facing side of one connection: its identity and the sender half of
/// its bounded outbound queue.
pub struct ClientHandle {
    pub(crate) id: ConnectionId,
    pub(crate) outbound_tx: mpsc::Sender<Arc<Message>>,
}

impl ClientHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Append to the connection's outbound queue. A full queue blocks the
    /// caller until the connection's flush loop drains it: a slow consumer
    /// throttles its own fan-out workers instead of dropping messages.
    pub async fn enqueue(&self, msg: Arc<Message>) -> Result<(), ConnectionError> {
        self.outbound_tx
            .send(msg)
            .await
            .map_err(|_| ConnectionError::Closed)
    }
}

/// Activity classification for one connection, from time since the last
/// acknowledged activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Recent activity; nothing to do.
    Fresh,
    /// Quiet long enough that a probe should be sent.
    ProbeDue,
    /// Quiet past the hard threshold; the connection is dead.
    Expired,
}

pub(crate) fn liveness(elapsed: Duration, min_ping: Duration, max_ping: Duration) -> Liveness {
    if elapsed < min_ping {
        Liveness::Fresh
    } else if elapsed < max_ping {
        Liveness::ProbeDue
    } else {
        Liveness::Expired
    }
}

/// One live client session. Created when a transport handshake completes;
/// gone when [`Connection::serve`] returns, which always closes the transport
/// and removes the membership entry.
pub struct Connection {
    id: ConnectionId,
    hub: Arc<Hub>,
    cfg: ConnectionConfig,
    outbound_rx: mpsc::Receiver<Arc<Message>>,
    // Written by the read task (pong) and the serve loop (completed write).
    last_activity: Arc<Mutex<Instant>>,
}

impl Connection {
    pub fn new(hub: Arc<Hub>, cfg: ConnectionConfig) -> (Self, Arc<ClientHandle>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(cfg.queue_size);
        let id = Uuid::new_v4();
        let handle = Arc::new(ClientHandle { id, outbound_tx });
        let conn = Self {
            id,
            hub,
            cfg,
            outbound_rx,
            last_activity: Arc::new(Mutex::new(Instant::now())),
        };
        (conn, handle)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The connection's main loop. Runs until a read error, write error, or
    /// liveness expiry; every exit path closes the transport and leaves the
    /// hub.
    pub async fn serve<R, W>(mut self, reader: R, mut writer: W)
    where
        R: TransportReader + 'static,
        W: TransportWriter,
    {
        let rw_deadline = Duration::from_secs(self.cfg.rw_deadline_secs);
        let min_ping = Duration::from_secs(self.cfg.min_ping_secs);
        let max_ping = Duration::from_secs(self.cfg.max_ping_secs);

        let (err_tx, mut err_rx) = mpsc::channel::<ConnectionError>(1);
        let read_task = tokio::spawn(read_loop(
            reader,
            Arc::clone(&self.hub),
            Arc::clone(&self.last_activity),
            rw_deadline,
            err_tx,
        ));

        let mut flush = interval(Duration::from_millis(self.cfg.flush_ms));
        flush.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut liveness_tick = interval(min_ping);
        liveness_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut batch: Vec<Arc<Message>> = Vec::with_capacity(self.cfg.max_per_flush);

        loop {
            tokio::select! {
                _ = flush.tick() => {
                    // Drain at most one batch per tick and issue exactly one
                    // write for it; per-write overhead dominates at high
                    // fan-out.
                    batch.clear();
                    while batch.len() < self.cfg.max_per_flush {
                        match self.outbound_rx.try_recv() {
                            Ok(msg) => batch.push(msg),
                            Err(_) => break,
                        }
                    }
                    if batch.is_empty() {
                        continue;
                    }
                    match timeout(rw_deadline, writer.write_batch(&batch)).await {
                        Ok(Ok(())) => touch(&self.last_activity),
                        Ok(Err(e)) => {
                            warn!(conn_id = %self.id, error = %e, "batch write failed");
                            break;
                        }
                        Err(_) => {
                            warn!(conn_id = %self.id, "write deadline exceeded");
                            break;
                        }
                    }
                }

                _ = liveness_tick.tick() => {
                    let elapsed = self.last_activity.lock().unwrap().elapsed();
                    match liveness(elapsed, min_ping, max_ping) {
                        Liveness::Fresh => {}
                        Liveness::ProbeDue => {
                            // A probe does not count as activity; only the
                            // pong coming back does.
                            match timeout(rw_deadline, writer.write_ping()).await {
                                Ok(Ok(())) => {}
                                Ok(Err(e)) => {
                                    warn!(conn_id = %self.id, error = %e, "probe write failed");
                                    break;
                                }
                                Err(_) => {
                                    warn!(conn_id = %self.id, "probe write deadline exceeded");
                                    break;
                                }
                            }
                        }
                        Liveness::Expired => {
                            debug!(conn_id = %self.id, "liveness expired, terminating");
                            break;
                        }
                    }
                }

                Some(err) = err_rx.recv() => {
                    debug!(conn_id = %self.id, error = %err, "read loop ended");
                    break;
                }
            }
        }

        writer.close().await;
        read_task.abort();
        self.hub.leave(self.id);
    }
}

/// Inbound half: decode one frame at a time and republish data messages to
/// the hub. Any failure is reported once and ends the loop; the serve loop
/// tears the connection down.
async fn read_loop<R: TransportReader>(
    mut reader: R,
    hub: Arc<Hub>,
    last_activity: Arc<Mutex<Instant>>,
    rw_deadline: Duration,
    err_tx: mpsc::Sender<ConnectionError>,
) {
    loop {
        let frame = match timeout(rw_deadline, reader.read_frame()).await {
            Ok(Ok(frame)) => frame,
            Ok(Err(e)) => {
                let _ = err_tx.send(e).await;
                return;
            }
            Err(_) => {
                let _ = err_tx.send(ConnectionError::DeadlineExceeded).await;
                return;
            }
        };
        match frame {
            Frame::Message(msg) => {
                if hub.publish(Arc::new(msg)).await.is_err() {
                    let _ = err_tx.send(ConnectionError::Closed).await;
                    return;
                }
            }
            Frame::Pong => touch(&last_activity),
            Frame::Closed => {
                let _ = err_tx.send(ConnectionError::Closed).await;
                return;
            }
        }
    }
}

/// Monotonic update: concurrent writers never move the timestamp backward.
fn touch(last_activity: &Mutex<Instant>) {
    let now = Instant::now();
    let mut last = last_activity.lock().unwrap();
    if *last < now {
        *last = now;
    }
}
