//! HTTP server launch
//!
//! Binds the chat app and serves it until ctrl-c. Launch options cover
//! the bind address, port, a share toggle that widens the bind to all
//! interfaces, and the debug, error-display and quiet flags.

use tokio::net::TcpListener;
use tracing::info;

use crate::engine::ChatEngine;
use crate::error::ChatError;
use crate::sampling::SamplerOptions;
use crate::web;

/// Pass-through launch configuration for the chat UI.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub host: String,
    pub port: u16,
    /// Expose the UI beyond loopback. There is no tunnel service in
    /// this stack; sharing means binding every interface.
    pub share: bool,
    /// Raise log verbosity to debug at startup.
    pub debug: bool,
    /// Include failure detail in HTTP error responses.
    pub show_errors: bool,
    /// Suppress the startup banner.
    pub quiet: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7860,
            share: false,
            debug: false,
            show_errors: true,
            quiet: false,
        }
    }
}

impl LaunchOptions {
    /// Host the listener binds. Sharing overrides the configured host
    /// with the all-interfaces address.
    pub fn bind_host(&self) -> &str {
        if self.share {
            "0.0.0.0"
        } else {
            &self.host
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host(), self.port)
    }

    /// URL shown in the banner. The all-interfaces address is not
    /// routable from a browser, so it renders as localhost.
    pub fn advertised_url(&self) -> String {
        let host = match self.bind_host() {
            "0.0.0.0" | "::" => "localhost",
            host => host,
        };
        format!("http://{}:{}", host, self.port)
    }
}

/// The chat service, ready to bind.
pub struct ChatServer {
    engine: ChatEngine,
    defaults: SamplerOptions,
    options: LaunchOptions,
}

impl ChatServer {
    pub fn new(engine: ChatEngine, defaults: SamplerOptions, options: LaunchOptions) -> Self {
        Self {
            engine,
            defaults,
            options,
        }
    }

    /// Serve until ctrl-c.
    pub async fn serve(self) -> Result<(), ChatError> {
        let state = web::AppState::new(self.engine, self.defaults, self.options.show_errors);
        let app = web::router(state);

        let addr = self.options.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ChatError::ServerError(format!("failed to bind {}: {}", addr, e)))?;

        if !self.options.quiet {
            println!("💬 chat UI ready at {}", self.options.advertised_url());
            if self.options.share {
                println!("🌐 listening on all interfaces, port {}", self.options.port);
            }
        }
        info!(addr = %addr, "server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ChatError::ServerError(e.to_string()))
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_addr() {
        let options = LaunchOptions::default();
        assert_eq!(options.bind_addr(), "0.0.0.0:7860");

        let local = LaunchOptions {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Default::default()
        };
        assert_eq!(local.bind_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_share_forces_all_interfaces() {
        let options = LaunchOptions {
            host: "127.0.0.1".to_string(),
            share: true,
            ..Default::default()
        };
        assert_eq!(options.bind_host(), "0.0.0.0");
        assert_eq!(options.bind_addr(), "0.0.0.0:7860");
    }

    #[test]
    fn test_advertised_url() {
        let options = LaunchOptions::default();
        assert_eq!(options.advertised_url(), "http://localhost:7860");

        let named = LaunchOptions {
            host: "chat.internal".to_string(),
            port: 80,
            ..Default::default()
        };
        assert_eq!(named.advertised_url(), "http://chat.internal:80");
    }
}
