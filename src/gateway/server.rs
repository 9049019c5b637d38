//! Gateway server — wires the subsystems together and runs the HTTP
//! listener with graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use super::router::{AppState, create_router};
use crate::audit::TracingAuditLog;
use crate::config::Config;
use crate::directory::CoordinatorClient;
use crate::keys::{JwksPublisher, RotationController, load_keys};
use crate::oauth::{HttpIdentityBroker, LoginFlow};
use crate::token::TokenAuthority;
use crate::{Error, Result};

/// Timeout applied to outbound provider calls through the shared client.
const OUTBOUND_TIMEOUT: Duration = Duration::from_secs(10);

/// The authentication gateway server.
pub struct Gateway {
    config: Config,
    state: Arc<AppState>,
}

impl Gateway {
    /// Assemble the gateway from configuration: load signing keys, build the
    /// key authority and login flow, and prepare the shared state.
    pub fn new(config: Config) -> Result<Self> {
        let store = load_keys(&config.keys, |name| std::env::var(name).ok())?;

        let jwks = Arc::new(JwksPublisher::new(Arc::clone(&store)));
        let rotation = Arc::new(RotationController::new(Arc::clone(&store), Arc::clone(&jwks)));
        let authority = Arc::new(TokenAuthority::new(Arc::clone(&store), &config.token));

        let http = reqwest::Client::builder()
            .timeout(OUTBOUND_TIMEOUT)
            .build()
            .map_err(|e| Error::Internal(format!("Cannot build HTTP client: {e}")))?;

        let broker = Arc::new(HttpIdentityBroker::new(
            http.clone(),
            &config.providers,
            &config.server.public_url,
        ));
        let directory = Arc::new(CoordinatorClient::new(http, &config.directory));

        let flow = Arc::new(LoginFlow::new(
            broker.clone(),
            directory,
            Arc::clone(&authority),
        ));

        let secure_cookies = config.server.public_url.starts_with("https://");
        if !secure_cookies {
            warn!("public_url is not HTTPS — cookies will be set without the Secure attribute");
        }

        let state = Arc::new(AppState {
            flow,
            authority,
            jwks,
            rotation,
            audit: Arc::new(TracingAuditLog),
            admin_token: config.admin.resolve_bearer_token(),
            pages: config.pages.clone(),
            secure_cookies,
        });

        info!(
            providers = ?broker.registered().iter().map(|p| p.as_str()).collect::<Vec<_>>(),
            keys = state.rotation.status().key_count,
            "Gateway assembled"
        );

        Ok(Self { config, state })
    }

    /// Shared state, exposed for integration tests.
    #[must_use]
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Run the gateway until shutdown.
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let status = self.state.rotation.status();
        let app = create_router(Arc::clone(&self.state), self.config.server.request_timeout);

        let listener = TcpListener::bind(addr).await?;

        info!("============================================================");
        info!("AUTH GATEWAY v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(host = %self.config.server.host, port = self.config.server.port, "Listening");
        info!(
            active = status.active_kid.as_deref().unwrap_or("<none>"),
            keys = status.key_count,
            "Signing keys"
        );

        if status.key_count == 0 {
            warn!("NO SIGNING KEYS loaded — logins will fail until keys are configured");
        }
        if self.state.admin_token.is_none() {
            warn!("No admin token configured — key rotation endpoints are disabled");
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

/// Resolve on ctrl-c or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received ctrl-c, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
