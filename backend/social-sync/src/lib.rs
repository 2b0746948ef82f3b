pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod identity;
pub mod metrics;
pub mod repository;
pub mod services;
pub mod session;
pub mod telemetry;

pub use client::SocialClient;
pub use config::Config;
pub use error::{ErrorSurface, SocialError, SocialResult};
