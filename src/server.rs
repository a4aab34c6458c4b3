use crate::bot_filter::BotFilter;
use crate::config::Config;
use crate::config_validator::ConfigValidator;
use crate::error::{GateError, Result};
use crate::gate::{gate_middleware, Gate};
use crate::handlers::{health_check, readiness_check, AppState};
use crate::health::HealthChecker;
use crate::middleware::logging_middleware;
use crate::proxy::{proxy_handler, Upstream};
use crate::rate_limit_config::RateLimitConfig;
use crate::rate_limiter::RateLimiter;
use axum::routing::get;
use axum::{middleware, Router};
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub struct Server {
    config: Config,
    state: AppState,
}

impl Server {
    pub fn new(config: Config) -> Result<Self> {
        ConfigValidator::validate_config(&config)?;

        let rules = RateLimitConfig::default();
        ConfigValidator::validate_rate_limits(&rules)?;

        let state = build_state(&config, RateLimiter::new(rules))?;
        Ok(Self { config, state })
    }

    pub async fn run(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await
            .map_err(|e| GateError::Configuration(format!("Failed to bind {}: {}", self.config.bind_addr, e)))?;

        let sweeper = self
            .state
            .gate
            .limiter()
            .spawn_cleanup_task(self.config.cleanup_interval());

        tracing::info!("Gate listening on {}", self.config.bind_addr);
        tracing::info!("Forwarding allowed traffic to {}", self.state.upstream.base_url());
        tracing::info!("Health check available at /health");

        let app = create_app(self.state, self.config.enable_tracing);

        // Run server with graceful shutdown
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        sweeper.abort();
        served.map_err(|e| GateError::Internal(format!("Server error: {}", e)))
    }
}

/// Assemble router state around a rate limiter.
pub fn build_state(config: &Config, limiter: RateLimiter) -> Result<AppState> {
    let upstream = Upstream::new(&config.upstream_url, config.upstream_timeout())?;
    let gate = Gate::new(limiter.clone(), BotFilter::default());
    let health = HealthChecker::new(limiter, upstream.clone());

    Ok(AppState {
        gate,
        upstream,
        health,
    })
}

/// Health endpoints plus an upstream fallback, all behind the gate.
pub fn create_app(state: AppState, enable_tracing: bool) -> Router {
    let router = Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .fallback(proxy_handler)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(logging_middleware))
                .layer(middleware::from_fn_with_state(state.gate.clone(), gate_middleware)),
        )
        .with_state(state);

    if enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
