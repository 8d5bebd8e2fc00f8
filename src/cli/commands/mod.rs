//! CLI command implementations

pub mod cache;
pub mod config;
pub mod pull;

pub use cache::execute as cache;
pub use config::execute as config;
pub use pull::execute as pull;
