//! Server setup and lifecycle management

use crate::api::create_router;
use crate::api::rest::state::AppState;
use crate::config::ServiceConfig;
use crate::error::{ServiceError, ServiceResult};
use infinity_core::ExperimentFlow;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Infinity HTTP server
pub struct Server {
    config: ServiceConfig,
    flow: Arc<ExperimentFlow>,
}

impl Server {
    /// Create a new server with the given configuration
    pub fn new(config: ServiceConfig) -> ServiceResult<Self> {
        if config.experiment.set_size == 0 {
            return Err(ServiceError::Config("set_size must be at least 1".to_string()));
        }
        config
            .experiment
            .canvas
            .validate()
            .map_err(ServiceError::Config)?;
        let flow = Arc::new(ExperimentFlow::new(Arc::new(config.experiment.clone())));
        Ok(Self { config, flow })
    }

    /// Run the server until a shutdown signal arrives
    pub async fn run(self) -> ServiceResult<()> {
        let addr = self.config.server.listen_addr;

        let state = AppState::new(self.flow.clone());
        let app = create_router(state, self.config.server.enable_cors);

        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Infinity listening on {}", addr);
        tracing::info!(
            data_dir = %self.config.experiment.data_dir.display(),
            set_size = self.config.experiment.set_size,
            "experiment store"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServiceError::Server(e.to_string()))?;

        tracing::info!("Infinity shutting down");
        Ok(())
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_set_size_is_rejected() {
        let mut config = ServiceConfig::default();
        config.experiment.set_size = 0;
        assert!(matches!(Server::new(config), Err(ServiceError::Config(_))));
    }

    #[test]
    fn canvas_without_room_inside_border_is_rejected() {
        let mut config = ServiceConfig::default();
        config.experiment.canvas.border = 250;
        match Server::new(config) {
            Err(ServiceError::Config(message)) => assert!(message.contains("border of 250")),
            _ => panic!("expected a configuration error"),
        }
    }
}
