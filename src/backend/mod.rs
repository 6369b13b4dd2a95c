mod config;
mod cookies;
mod flow;
mod http;

pub use config::{BackendSettings, DEFAULT_COOKIE_NAME, DEFAULT_POST_LOGIN_PATH, StatePolicy};
pub use flow::AuthBackend;
pub use http::router;
