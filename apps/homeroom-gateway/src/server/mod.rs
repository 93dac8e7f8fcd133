pub(crate) mod auth;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod errors;
pub(crate) mod gateway_events;
pub(crate) mod handlers;
pub(crate) mod metrics;
pub(crate) mod presence;
pub(crate) mod realtime;
pub(crate) mod router;
pub(crate) mod store;
#[cfg(test)]
mod tests;
pub(crate) mod types;

pub use self::auth::issue_access_token;
pub use self::core::{AppConfig, ACCESS_TOKEN_TTL_SECS, DEFAULT_MAX_GATEWAY_EVENT_BYTES};
pub use self::errors::init_tracing;
pub use self::router::build_router;
