#![forbid(unsafe_code)]

mod server;

pub use server::{
    build_router, init_tracing, issue_access_token, AppConfig, ACCESS_TOKEN_TTL_SECS,
    DEFAULT_MAX_GATEWAY_EVENT_BYTES,
};
