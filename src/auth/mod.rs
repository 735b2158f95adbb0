//! API key authentication
//!
//! Access control is uniform: every caller presenting the configured key is
//! treated the same. Configure it via `deepbench.toml`:
//!
//! ```toml
//! [auth]
//! api_key_env = "DEEPBENCH_API_KEY"
//! ```
//!
//! When the variable is unset or empty the `/research` routes are open.

/// Bearer-key middleware for protected routes.
pub mod middleware;
