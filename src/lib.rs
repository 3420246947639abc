// Looper - continuous AI-assisted optimization loops
// Library exports

// Domain
pub mod errors;
pub mod goals;
pub mod metrics;

// Backend
pub mod client;

// Loop engine
pub mod looper;
pub mod project;
pub mod registry;

// Transport
pub mod server;

// Infrastructure
pub mod config;
pub mod logging;
pub mod monitoring;

pub use errors::{LooperError, Result};
