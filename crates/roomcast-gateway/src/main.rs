use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use roomcast_core::config::RoomcastConfig;
use roomcast_hub::{Backplane, Hub, LoopbackBackplane, RedisBackplane};
use tracing::{info, warn};

mod app;
mod ws;

#[derive(Parser, Debug)]
#[command(name = "roomcast-gateway", about = "Real-time WebSocket broadcast hub")]
struct Args {
    /// Path to roomcast.toml
    #[arg(long)]
    config: Option<String>,

    /// Bind address
    #[arg(long)]
    bind: Option<String>,

    /// Listen port
    #[arg(long)]
    port: Option<u16>,

    /// Hub instance name (presence-map field in clustered mode)
    #[arg(long)]
    name: Option<String>,

    /// Join other instances over Redis instead of running standalone
    #[arg(long)]
    clustered: bool,

    /// Redis URL for the clustered backplane
    #[arg(long)]
    redis_url: Option<String>,

    /// Backplane pub/sub channel shared by all instances of this room
    #[arg(long)]
    redis_channel: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roomcast=info,roomcast_hub=info,tower_http=warn".into()),
        )
        .init();

    let args = Args::parse();
    let mut config = RoomcastConfig::load(args.config.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        RoomcastConfig::default()
    });

    // flags override file/env config
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(name) = args.name {
        config.hub.name = name;
    }
    if args.clustered {
        config.hub.standalone = false;
    }
    if let Some(url) = args.redis_url {
        config.redis.url = url;
    }
    if let Some(channel) = args.redis_channel {
        config.hub.channel = channel;
    }

    let backplane: Box<dyn Backplane> = if config.hub.standalone {
        info!(hub = %config.hub.name, "standalone mode, no backplane");
        Box::new(LoopbackBackplane::new(config.hub.queue_size))
    } else {
        info!(
            hub = %config.hub.name,
            channel = %config.hub.channel,
            url = %config.redis.url,
            "clustered mode, connecting backplane"
        );
        Box::new(RedisBackplane::connect(&config.redis.url, &config.hub.channel).await?)
    };

    let hub = Hub::new(config.hub.clone(), backplane);
    let hub_task = tokio::spawn(Arc::clone(&hub).run());

    let state = Arc::new(app::AppState {
        config: config.clone(),
        hub: Arc::clone(&hub),
    });
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    info!("roomcast gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // hub teardown deregisters this instance's presence entry
    hub.shutdown();
    let _ = hub_task.await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
