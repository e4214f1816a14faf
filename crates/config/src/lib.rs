//! Configuration loading for the token helper.
//!
//! Uses figment to layer built-in defaults, an optional YAML file and
//! `OAUTH2_TOKEN_*` environment variables. CLI flags are applied on top by
//! the binary.

pub mod schema;

pub use schema::{
    Config, DEFAULT_AUTHORITY, DEFAULT_CLIENT_ID, DEFAULT_REDIRECT_URI, DEFAULT_SCOPE, LogConfig,
    LogFormat,
};
