//! API server initialization

use std::net::SocketAddr;

use anyhow::Result;
use axum::Router;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::auth::{AuthState, require_auth};
use super::routes::health::{self, HealthState};
use super::routes::{oauth, subscriptions, topics};
use crate::core::CoreApp;

pub struct ApiServer {
    app: CoreApp,
}

impl ApiServer {
    pub fn new(app: CoreApp) -> Self {
        Self { app }
    }

    pub async fn start(self) -> Result<()> {
        let app = self.app;
        let shutdown = app.shutdown.clone();

        let addr = SocketAddr::new(app.config.server.host.parse()?, app.config.server.port);

        let metrics_handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow::anyhow!("Failed to install metrics recorder: {}", e))?;

        let auth_state = AuthState {
            auth: app.auth.clone(),
            database: app.database.clone(),
        };

        // Broker routes sit behind the auth middleware; health, metrics and
        // the token endpoint stay public.
        let topics_routes = topics::routes(app.database.clone()).layer(
            axum::middleware::from_fn_with_state(auth_state.clone(), require_auth),
        );
        let subscriptions_routes = subscriptions::routes(
            app.database.clone(),
            app.config.subscription_defaults.clone(),
        )
        .layer(axum::middleware::from_fn_with_state(
            auth_state.clone(),
            require_auth,
        ));
        let oauth_routes = oauth::routes(app.database.clone(), app.auth.clone());

        let health_state = HealthState {
            database: app.database.clone(),
            metrics: metrics_handle,
        };

        let router = Router::new()
            .route("/liveness", get(health::liveness))
            .route("/readiness", get(health::readiness))
            .route("/metrics", get(health::metrics))
            .with_state(health_state)
            .nest("/topics", topics_routes)
            .nest("/subscriptions", subscriptions_routes)
            .nest("/oauth", oauth_routes)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive());

        let listener = TcpListener::bind(addr).await?;
        tracing::info!(
            addr = %addr,
            auth_enabled = app.auth.enabled(),
            "API server listening"
        );

        // Ctrl-C triggers the coordinated shutdown; the serve loop drains
        // in-flight requests before returning.
        let signal_shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl-C, shutting down");
                signal_shutdown.trigger();
            }
        });

        let mut shutdown_rx = shutdown.subscribe();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            })
            .await?;

        shutdown.shutdown().await;
        Ok(())
    }
}
