pub mod bot_filter;
pub mod category;
pub mod clock;
pub mod config;
pub mod config_validator;
pub mod error;
pub mod gate;
pub mod handlers;
pub mod health;
pub mod identity;
pub mod middleware;
pub mod proxy;
pub mod rate_limit_config;
pub mod rate_limiter;
pub mod response;
pub mod server;

pub use config::Config;
pub use error::{GateError, Result};
pub use gate::{Gate, GateOutcome};
pub use rate_limiter::{RateLimitDecision, RateLimiter};
pub use server::create_app;
