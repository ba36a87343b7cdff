//! Turns validated discovery arguments into a continuously refreshed set of
//! target groups.
//!
//! Backends only provide an [`Arguments`] implementation and a
//! [`DiscovererFactory`], the lifecycle around them (defaults, validation,
//! conversion, polling, publishing and reconfiguration) lives in [`Component`].

mod arguments;
mod component;
mod discoverer;
pub mod ec2;
mod error;
pub mod file;
mod filter;
pub mod http;
mod scheduler;
mod secret;
mod shutdown;
mod state;
pub mod static_config;
mod target;
#[cfg(test)]
mod testing;

pub use arguments::Arguments;
pub use component::Component;
pub use discoverer::{Discoverer, DiscovererFactory};
pub use error::{ConfigError, PollError, ResolutionError, UpdateError};
pub use filter::Filter;
pub use secret::SecretString;
pub use state::{Phase, Snapshot, Status};
pub use target::{ADDRESS_LABEL, Labels, Target, TargetGroup};

#[macro_use]
extern crate tracing;

/// Opaque error of a backend, dynamically dispatched and safe to send across threads
pub type Error = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type defined in terms of [`Error`] and generic over `T`
pub type Result<T> = std::result::Result<T, Error>;
