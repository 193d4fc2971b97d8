//! Observability subsystem.
//!
//! Resolvers emit `tracing` events directly; this module only wires up the
//! subscriber for binaries.

pub mod logging;

pub use logging::init_logging;
