//! Fetches a single Deezer track with an `arl` session cookie.
//!
//! The flow is strictly linear: [`session::authenticate`] →
//! [`metadata::fetch_metadata`] → [`resolver::resolve`] →
//! [`decoder::download`], driven end to end by [`pipeline::acquire`].

pub mod config;
pub mod decoder;
pub mod error;
pub mod gateway;
pub mod helpers;
pub mod keys;
pub mod link;
pub mod metadata;
pub mod pipeline;
pub mod progress;
pub mod resolver;
pub mod session;

pub use config::{Config, Credential};
pub use error::AcquireError;
pub use link::AssetId;
pub use pipeline::{Acquired, acquire, run};
