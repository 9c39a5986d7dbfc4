use anyhow::Context;
use rustydocqa::{api, config, logging, processing};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::init_config().context("Failed to load configuration")?;
    logging::init_tracing();
    let config = config::get_config();
    let service = Arc::new(
        processing::ProcessingService::new(config)
            .context("Failed to initialize processing service")?,
    );
    spawn_session_sweeper(Arc::clone(&service));
    let app = api::create_router(service, config.max_upload_bytes);

    let (listener, port) = bind_listener().await.context("Failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

/// Periodically evict idle sessions and their vectors.
fn spawn_session_sweeper(service: Arc<processing::ProcessingService>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(EVICTION_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let evicted = service.evict_sessions().await;
            if evicted > 0 {
                tracing::debug!(evicted, "Session sweep finished");
            }
        }
    });
}

async fn bind_listener() -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    let config = config::get_config();
    if let Some(port) = config.server_port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 8000..=8099;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 8000-8099",
    ))
}
