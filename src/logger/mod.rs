//! Tracing bootstrap is a simple utility verified by hand; every demo
//! binary under `src/bin/` runs through it.

mod logger;
pub use logger::*;

pub use tracing::{debug, error, info, trace, warn};
