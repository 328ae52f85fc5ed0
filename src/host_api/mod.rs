pub mod middleware;
pub mod user;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{middleware as axum_middleware, routing, Router};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::GatewayConfig;
use crate::credentials::CredentialValidator;
use crate::error::{GatewayError, GatewayResult};
use crate::service::event_log::EventLog;
use middleware::GateState;

/// Build the gateway router: the protected resource at `config.path`, any
/// method, behind the Basic auth gate. Other paths fall through to 404
/// without a challenge.
pub fn router(
    config: &GatewayConfig,
    validator: Arc<dyn CredentialValidator>,
    events: Arc<dyn EventLog>,
) -> GatewayResult<Router> {
    let gate = GateState::new(validator, events, &config.realm)?;

    Ok(Router::new()
        .route(&config.path, routing::any(user::active_user))
        .route_layer(axum_middleware::from_fn_with_state(
            gate,
            middleware::auth_gate,
        )))
}

/// A router with its listening socket already bound.
///
/// Binding is split from serving so a port conflict surfaces before the
/// service reports `Running`.
pub struct HostServer {
    listener: TcpListener,
    app: Router,
    local_addr: SocketAddr,
}

pub async fn bind(addr: SocketAddr, app: Router) -> GatewayResult<HostServer> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| GatewayError::Bind { addr, source })?;
    let local_addr = listener.local_addr()?;
    log::info!("Host API server listening on {}", local_addr);

    Ok(HostServer {
        listener,
        app,
        local_addr,
    })
}

impl HostServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until the process exits.
    pub async fn serve(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.app).await
    }

    /// Serve until `signal` resolves, then stop accepting and let in-flight
    /// requests finish.
    pub async fn serve_until<F>(self, signal: F) -> std::io::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        axum::serve(self.listener, self.app)
            .with_graceful_shutdown(signal)
            .await
    }

    /// Serve on a background task.
    pub fn spawn(self) -> JoinHandle<std::io::Result<()>> {
        tokio::spawn(self.serve())
    }
}
