//! Observability module providing structured logging.
//!
//! Every pipeline stage reports its start and completion through `tracing`
//! events with `table`, `key` and `bucket` fields; this module installs the
//! subscriber that renders them.

mod tracing_init;

pub use tracing_init::*;
