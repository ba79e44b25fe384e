//! Shared HTTP fixtures for integration tests.

use std::sync::Once;

use axum::Router;

static INIT_LOGGING: Once = Once::new();

/// Serves a router on an ephemeral local port, returning the base URL.
pub async fn spawn_fixture(app: Router) -> String {
    INIT_LOGGING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .try_init()
            .ok();
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// A plausible MP4 payload: valid ftyp header followed by filler of the
/// requested total size, tagged with a marker byte for order probing.
pub fn mp4_payload(total_size: usize, marker: u8) -> Vec<u8> {
    let mut data = vec![0x00, 0x00, 0x00, 0x20];
    data.extend_from_slice(b"ftypisom");
    data.extend_from_slice(&[0u8; 4]);
    data.push(marker);
    data.resize(total_size, 0xAB);
    data
}
