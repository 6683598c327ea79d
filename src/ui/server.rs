//! HTTP control surface
//!
//! Reads status and writes gain. Everything else lives in the core.

use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir};

use crate::config::UiConfig;
use crate::control::SharedControlState;
use crate::error::{Error, NetworkError};
use crate::ui::handlers;

/// State shared by all handlers
pub struct AppState {
    pub control: SharedControlState,
    pub min_gain: f64,
    pub max_gain: f64,
}

/// Web server for status and gain control
pub struct WebServer {
    addr: SocketAddr,
    static_dir: Option<PathBuf>,
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(config: &UiConfig, control: SharedControlState) -> Self {
        Self {
            addr: config.socket_addr(),
            static_dir: config.static_dir.clone(),
            state: Arc::new(AppState {
                control,
                min_gain: config.min_gain,
                max_gain: config.max_gain,
            }),
        }
    }

    /// Build the router
    pub fn router(&self) -> Router {
        let api = Router::new()
            .route("/status", get(handlers::get_status))
            .route("/control", post(handlers::set_control))
            .route("/health", get(handlers::health))
            .with_state(self.state.clone());

        let app = match &self.static_dir {
            Some(dir) => api.fallback_service(ServeDir::new(dir)),
            None => api,
        };

        app.layer(CorsLayer::permissive())
    }

    /// Bind and serve until `shutdown` resolves
    pub async fn serve<F>(self, shutdown: F) -> Result<(), Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| NetworkError::BindFailed(format!("{}: {}", self.addr, e)))?;
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve_on<F>(
        self,
        listener: tokio::net::TcpListener,
        shutdown: F,
    ) -> Result<(), Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!("Control surface on http://{}", listener.local_addr()?);
        if let Some(dir) = &self.static_dir {
            tracing::info!("Serving UI files from {}", dir.display());
        }

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("Control surface stopped");
        Ok(())
    }
}
