//! # Web Service Example
//!
//! Boots the engine and serves the chat UI plus the JSON API, the same
//! thing `stonechat serve` does with configuration layered on top.
//!
//! Features demonstrated:
//! - The embedded chat page at /
//! - REST endpoints for chat, history and memory diagnostics
//! - Server-sent events for streamed replies
//! - Health checks and metrics
//!
//! Run with: cargo run --example web_service

use stonechat::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🌐 Stonechat Web Service Example");
    println!("================================");

    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load and download the default checkpoint
    println!("📂 Loading model...");
    let engine = ChatEngine::boot(EngineOptions::default()).await?;
    println!("✅ Model loaded");

    // Print available endpoints
    print_endpoints();

    // Serve on the default address, overridable through PORT
    let mut options = LaunchOptions::default();
    if let Ok(port) = std::env::var("PORT") {
        options.port = port.parse().unwrap_or(options.port);
    }

    let server = ChatServer::new(engine, SamplerOptions::default(), options);
    server.serve().await?;

    Ok(())
}

fn print_endpoints() {
    println!("\n📍 Available endpoints:");
    println!("   GET  /                   - Chat page");
    println!("   POST /api/chat           - One chat turn");
    println!("   POST /api/chat/stream    - Streamed chat turn (SSE)");
    println!("   GET  /api/history        - Conversation log");
    println!("   POST /api/history/clear  - Reset the conversation");
    println!("   GET  /api/memory         - Memory report");
    println!("   POST /api/memory/clear   - Clear memory and report");
    println!("   GET  /health             - Health check");
    println!();
}
