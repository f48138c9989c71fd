use confab::signaling::{DEFAULT_PORT, SignalServer};
use tracing::info;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let bind_addr = format!("0.0.0.0:{}", port);

    println!("   Confab Signaling Server");
    println!("   Binding to {}", bind_addr);
    println!("   Press Ctrl+C to stop\n");

    let server = SignalServer::new();

    tokio::select! {
        result = server.run(&bind_addr) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, closing");
            Ok(())
        }
    }
}
