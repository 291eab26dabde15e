//! Cluster-wide online count: once a second, report the local membership
//! count through the backplane's shared counter and broadcast the summed
//! total to local connections.

use std::sync::Arc;
use std::time::Duration;

use roomcast_protocol::Message;
use tokio::time::interval;
use tracing::warn;

use crate::hub::Hub;

pub(crate) async fn run(hub: Arc<Hub>) {
    let mut tick = interval(Duration::from_secs(hub.cfg.presence_interval_secs));
    loop {
        tokio::select! {
            _ = hub.done().cancelled() => return,

            _ = tick.tick() => {
                let local = hub.member_count();
                match hub.backplane.report_presence(hub.name(), local).await {
                    Ok(total) => {
                        if hub.broadcast(Arc::new(Message::info(total))).await.is_err() {
                            return;
                        }
                    }
                    // skip this tick; the next one retries naturally
                    Err(e) => warn!(hub = %hub.name(), error = %e, "presence update failed"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ClientHandle;
    use crate::testutil::SharedStoreBackplane;
    use roomcast_core::config::HubConfig;
    use tokio::sync::mpsc;
    use tokio::time::{timeout, Instant};
    use uuid::Uuid;

    fn clustered_hub(name: &str, store: &crate::testutil::PresenceStore) -> Arc<Hub> {
        let mut cfg = HubConfig::default();
        cfg.name = name.to_string();
        Hub::new(cfg, Box::new(SharedStoreBackplane::new(Arc::clone(store))))
    }

    fn members(hub: &Hub, n: usize) -> Vec<mpsc::Receiver<Arc<Message>>> {
        (0..n)
            .map(|_| {
                let (outbound_tx, outbound_rx) = mpsc::channel(126);
                hub.join(Arc::new(ClientHandle {
                    id: Uuid::new_v4(),
                    outbound_tx,
                }));
                outbound_rx
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn clustered_counts_sum_across_instances() {
        let store = SharedStoreBackplane::new_store();
        let hub_a = clustered_hub("node-a", &store);
        let hub_b = clustered_hub("node-b", &store);

        let mut rxs_a = members(&hub_a, 3);
        let _rxs_b = members(&hub_b, 5);

        tokio::spawn(Arc::clone(&hub_a).run());
        tokio::spawn(Arc::clone(&hub_b).run());

        // once both instances have reported, node-a's members see the
        // cluster-wide total
        let observer = &mut rxs_a[0];
        let total = timeout(Duration::from_secs(10), async {
            loop {
                let msg = observer.recv().await.expect("hub dropped");
                if let Some(info) = &msg.payload.info {
                    if info.online_count == 8 {
                        return info.online_count;
                    }
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(total, 8);

        hub_a.shutdown();
        hub_b.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn instance_registers_at_startup_before_first_interval() {
        let store = SharedStoreBackplane::new_store();
        let hub = clustered_hub("node-early", &store);
        let started = Instant::now();

        tokio::spawn(Arc::clone(&hub).run());

        // the first interval tick completes immediately, so the presence
        // entry appears without the clock moving at all
        for _ in 0..32 {
            tokio::task::yield_now().await;
        }
        assert_eq!(Instant::now(), started);
        assert_eq!(store.lock().unwrap().get("node-early"), Some(&0));

        hub.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn standalone_presence_is_local_membership() {
        let hub = {
            let cfg = HubConfig::default();
            let queue = cfg.queue_size;
            Hub::new(cfg, Box::new(crate::backplane::LoopbackBackplane::new(queue)))
        };
        let mut rxs = members(&hub, 2);
        tokio::spawn(Arc::clone(&hub).run());

        let msg = timeout(Duration::from_secs(5), rxs[0].recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg.payload.info.as_ref().unwrap().online_count, 2);

        hub.shutdown();
    }
}
