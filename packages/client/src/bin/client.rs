//! Interactive Trackline sync client.
//!
//! Simulates the device signals (sign-in, foreground/background, push
//! arrival) that drive the real-time sync core.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin trackline-client -- --api-url http://localhost:3000
//! ```

use clap::Parser;
use trackline_client::SyncConfig;
use trackline_shared::logger::setup_logger;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let config = SyncConfig::parse();

    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), &config.log_level);

    if let Err(e) = trackline_client::run_client(config).await {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}
