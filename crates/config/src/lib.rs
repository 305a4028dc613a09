//! Configuration loading for the tokenrelay proxy.
//!
//! Uses figment to layer built-in defaults, an optional YAML file and the
//! process environment into a validated, immutable [`Config`].

pub mod schema;

pub use schema::{Config, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_SCOPE};
